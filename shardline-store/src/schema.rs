//! Table layouts.
//!
//! Remote table DDL is out of scope; these descriptions tell the simulated
//! backend how to key and index items, and let callers build keys from
//! full items.

use crate::error::{StoreError, StoreResult};
use crate::item::Item;

/// Partition key plus optional sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// Partition (hash) key attribute.
    pub partition_key: String,
    /// Sort (range) key attribute.
    pub sort_key: Option<String>,
}

impl KeySchema {
    /// Creates a hash-only key schema.
    pub fn hash(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    /// Creates a hash + range key schema.
    pub fn composite(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }

    /// Returns the key attribute names in order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.partition_key.as_str()).chain(self.sort_key.as_deref())
    }

    /// Extracts the key attributes of an item.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a key attribute is missing.
    pub fn extract_key(&self, item: &Item) -> StoreResult<Item> {
        self.attributes()
            .map(|attr| {
                item.get(attr)
                    .map(|value| (attr.to_string(), value.clone()))
                    .ok_or_else(|| {
                        StoreError::validation(format!("missing key attribute '{attr}'"))
                    })
            })
            .collect()
    }

    /// Returns true if the item carries every key attribute.
    #[must_use]
    pub fn is_keyed(&self, item: &Item) -> bool {
        self.attributes().all(|attr| item.contains_key(attr))
    }
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Index key.
    pub key: KeySchema,
}

/// A table: name, primary key and secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Primary key.
    pub key: KeySchema,
    /// Secondary indexes.
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    /// Creates a table schema without indexes.
    pub fn new(name: impl Into<String>, key: KeySchema) -> Self {
        Self {
            name: name.into(),
            key,
            indexes: Vec::new(),
        }
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn with_index(mut self, name: impl Into<String>, key: KeySchema) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            key,
        });
        self
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|index| index.name == name)
    }
}
