//! Table layouts of the registry and the directory.

use shardline_core::TableConfig;
use shardline_store::{KeySchema, TableSchema};

use crate::model::attr;

/// Layout of the shard registry table.
///
/// Hash key `shard_name`; one index on `(entity_type, allocation_state)` and
/// one on `entity_type` alone.
#[must_use]
pub fn registry_table_schema(tables: &TableConfig) -> TableSchema {
    TableSchema::new(&tables.shard_registry, KeySchema::hash(attr::SHARD_NAME))
        .with_index(
            &tables.entity_allocation_index,
            KeySchema::composite(attr::ENTITY_TYPE, attr::ALLOCATION_STATE),
        )
        .with_index(&tables.entity_index, KeySchema::hash(attr::ENTITY_TYPE))
}

/// Layout of the assignment directory table.
#[must_use]
pub fn assignment_table_schema(tables: &TableConfig) -> TableSchema {
    TableSchema::new(
        &tables.shard_assignments,
        KeySchema::composite(attr::IDENTIFIER, attr::ENTITY_TYPE),
    )
}
