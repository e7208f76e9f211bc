//! Request and response shapes of the keyed-item backend.
//!
//! Batch responses expose an `unprocessed` residue with the same shape as
//! the request, which is what lets the executor re-issue only the part the
//! backend did not service.

use std::collections::BTreeMap;

use crate::expr::{Condition, UpdateAction};
use crate::item::{AttributeValue, Item};

// -----------------------------------------------------------------------------
// Single-item requests
// -----------------------------------------------------------------------------

/// Fetches one item by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetItemRequest {
    /// Table name.
    pub table: String,
    /// Full primary key.
    pub key: Item,
    /// Strongly consistent read.
    pub consistent_read: bool,
}

impl GetItemRequest {
    /// Creates an eventually consistent get.
    pub fn new(table: impl Into<String>, key: Item) -> Self {
        Self {
            table: table.into(),
            key,
            consistent_read: false,
        }
    }

    /// Requests a strongly consistent read.
    #[must_use]
    pub const fn consistent(mut self) -> Self {
        self.consistent_read = true;
        self
    }
}

/// Writes a whole item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutItemRequest {
    /// Table name.
    pub table: String,
    /// The item, including key attributes.
    pub item: Item,
    /// Optional precondition.
    pub condition: Option<Condition>,
}

impl PutItemRequest {
    /// Creates an unconditional put.
    pub fn new(table: impl Into<String>, item: Item) -> Self {
        Self {
            table: table.into(),
            item,
            condition: None,
        }
    }

    /// Attaches a precondition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Updates attributes of one item, creating it if absent.
///
/// The backend returns the item as it stands after the update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateItemRequest {
    /// Table name.
    pub table: String,
    /// Full primary key.
    pub key: Item,
    /// Actions applied in order.
    pub actions: Vec<UpdateAction>,
    /// Optional precondition.
    pub condition: Option<Condition>,
}

impl UpdateItemRequest {
    /// Creates an unconditional update.
    pub fn new(table: impl Into<String>, key: Item, actions: Vec<UpdateAction>) -> Self {
        Self {
            table: table.into(),
            key,
            actions,
            condition: None,
        }
    }

    /// Attaches a precondition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Deletes one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItemRequest {
    /// Table name.
    pub table: String,
    /// Full primary key.
    pub key: Item,
    /// Optional precondition.
    pub condition: Option<Condition>,
}

impl DeleteItemRequest {
    /// Creates an unconditional delete.
    pub fn new(table: impl Into<String>, key: Item) -> Self {
        Self {
            table: table.into(),
            key,
            condition: None,
        }
    }

    /// Attaches a precondition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

// -----------------------------------------------------------------------------
// Query / Scan
// -----------------------------------------------------------------------------

/// Equality query on a table or index key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Table name.
    pub table: String,
    /// Secondary index to query, or the table itself.
    pub index: Option<String>,
    /// Equality constraints on the key attributes; the partition key is
    /// required, the sort key optional.
    pub key_equals: Vec<(String, AttributeValue)>,
    /// Post-read filter.
    pub filter: Option<Condition>,
    /// Maximum items evaluated per page.
    pub limit: Option<u32>,
    /// Resume after this primary key.
    pub exclusive_start_key: Option<Item>,
}

impl QueryRequest {
    /// Creates a query on the table's primary key.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            index: None,
            key_equals: Vec::new(),
            filter: None,
            limit: None,
            exclusive_start_key: None,
        }
    }

    /// Targets a secondary index.
    #[must_use]
    pub fn on_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Adds a key equality constraint.
    #[must_use]
    pub fn key_eq(mut self, attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.key_equals.push((attribute.into(), value.into()));
        self
    }

    /// Adds a post-read filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Limits the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resumes after the given key.
    #[must_use]
    pub fn starting_after(mut self, key: Option<Item>) -> Self {
        self.exclusive_start_key = key;
        self
    }
}

/// Full-table scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    /// Table name.
    pub table: String,
    /// Post-read filter.
    pub filter: Option<Condition>,
    /// Maximum items evaluated per page.
    pub limit: Option<u32>,
    /// Resume after this primary key.
    pub exclusive_start_key: Option<Item>,
}

impl ScanRequest {
    /// Creates an unfiltered scan.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            limit: None,
            exclusive_start_key: None,
        }
    }

    /// Adds a post-read filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Limits the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resumes after the given key.
    #[must_use]
    pub fn starting_after(mut self, key: Option<Item>) -> Self {
        self.exclusive_start_key = key;
        self
    }
}

/// One page of query or scan results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Items on this page.
    pub items: Vec<Item>,
    /// Key to resume from, if more pages remain.
    pub last_evaluated_key: Option<Item>,
}

// -----------------------------------------------------------------------------
// Batch requests
// -----------------------------------------------------------------------------

/// Fetches many items across tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchGetRequest {
    /// Keys to fetch, per table.
    pub tables: BTreeMap<String, Vec<Item>>,
}

impl BatchGetRequest {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds keys for a table.
    #[must_use]
    pub fn with_keys(mut self, table: impl Into<String>, keys: Vec<Item>) -> Self {
        if !keys.is_empty() {
            self.tables.entry(table.into()).or_default().extend(keys);
        }
        self
    }

    /// Total number of keys across tables.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// Returns true if no keys are requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key_count() == 0
    }
}

/// Result of one batch-get call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchGetOutput {
    /// Items found, per table. Missing keys are simply absent.
    pub responses: BTreeMap<String, Vec<Item>>,
    /// Keys the backend did not service, per table.
    pub unprocessed: BTreeMap<String, Vec<Item>>,
}

/// One write within a batch-write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    /// Put a whole item.
    Put(Item),
    /// Delete by key.
    Delete(Item),
}

/// Writes many items across tables, unconditionally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteRequest {
    /// Writes, per table.
    pub tables: BTreeMap<String, Vec<WriteRequest>>,
}

impl BatchWriteRequest {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds writes for a table.
    #[must_use]
    pub fn with_writes(mut self, table: impl Into<String>, writes: Vec<WriteRequest>) -> Self {
        if !writes.is_empty() {
            self.tables.entry(table.into()).or_default().extend(writes);
        }
        self
    }

    /// Total number of writes across tables.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// Returns true if no writes are requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.write_count() == 0
    }
}

/// Result of one batch-write call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteOutput {
    /// Writes the backend did not service, per table.
    pub unprocessed: BTreeMap<String, Vec<WriteRequest>>,
}
