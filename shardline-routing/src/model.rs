//! Registry and directory records and their item encoding.

use serde::{Deserialize, Serialize};
use shardline_core::{AllocationState, EntityType, ShardName};
use shardline_store::{item, AttributeValue, Item, ItemExt, StoreError, StoreResult};

/// Attribute names shared by the registry and directory tables.
pub mod attr {
    /// Shard name; registry hash key.
    pub const SHARD_NAME: &str = "shard_name";
    /// Entity type label.
    pub const ENTITY_TYPE: &str = "entity_type";
    /// Allocation state of a shard.
    pub const ALLOCATION_STATE: &str = "allocation_state";
    /// Assigned identifier; directory hash key.
    pub const IDENTIFIER: &str = "identifier";
    /// Creation time, Unix seconds.
    pub const CREATED_AT: &str = "created_at";
    /// Last update time, Unix seconds.
    pub const UPDATED_AT: &str = "updated_at";
}

/// A registered physical shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Globally unique name; also the backend table name.
    pub name: ShardName,
    /// Kind of entity the shard stores.
    pub entity_type: EntityType,
    /// Whether the allocator may place new identifiers here.
    pub allocation_state: AllocationState,
    /// Creation time, Unix seconds.
    pub created_at_secs: u64,
    /// Last update time, Unix seconds.
    pub updated_at_secs: u64,
}

impl Shard {
    /// Returns true if the allocator may use this shard.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.allocation_state == AllocationState::Enabled
    }

    /// Encodes the shard as a registry row.
    #[must_use]
    pub fn to_item(&self) -> Item {
        item([
            (attr::SHARD_NAME, AttributeValue::s(self.name.as_str())),
            (attr::ENTITY_TYPE, AttributeValue::s(self.entity_type.as_str())),
            (
                attr::ALLOCATION_STATE,
                AttributeValue::s(self.allocation_state.as_str()),
            ),
            (attr::CREATED_AT, AttributeValue::from(self.created_at_secs)),
            (attr::UPDATED_AT, AttributeValue::from(self.updated_at_secs)),
        ])
    }

    /// Decodes a registry row.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a required attribute is missing or malformed.
    pub fn from_item(row: &Item) -> StoreResult<Self> {
        Ok(Self {
            name: parse(row.require_string(attr::SHARD_NAME)?)?,
            entity_type: parse(row.require_string(attr::ENTITY_TYPE)?)?,
            allocation_state: parse(row.require_string(attr::ALLOCATION_STATE)?)?,
            created_at_secs: row.u64_attr(attr::CREATED_AT).unwrap_or(0),
            updated_at_secs: row.u64_attr(attr::UPDATED_AT).unwrap_or(0),
        })
    }

    /// Primary key of the registry row for `name`.
    #[must_use]
    pub fn key(name: &ShardName) -> Item {
        item([(attr::SHARD_NAME, name.as_str())])
    }
}

/// A routing fact: `(identifier, entity_type)` lives on `shard_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Logical identifier, e.g. an owner address.
    pub identifier: String,
    /// Entity type the identifier belongs to.
    pub entity_type: EntityType,
    /// Shard holding the identifier's records.
    pub shard_name: ShardName,
    /// First assignment time, Unix seconds.
    pub created_at_secs: u64,
    /// Last assignment time, Unix seconds.
    pub updated_at_secs: u64,
}

impl Assignment {
    /// Encodes the assignment as a directory row.
    #[must_use]
    pub fn to_item(&self) -> Item {
        item([
            (attr::IDENTIFIER, AttributeValue::s(&self.identifier)),
            (attr::ENTITY_TYPE, AttributeValue::s(self.entity_type.as_str())),
            (attr::SHARD_NAME, AttributeValue::s(self.shard_name.as_str())),
            (attr::CREATED_AT, AttributeValue::from(self.created_at_secs)),
            (attr::UPDATED_AT, AttributeValue::from(self.updated_at_secs)),
        ])
    }

    /// Decodes a directory row.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a required attribute is missing or malformed.
    pub fn from_item(row: &Item) -> StoreResult<Self> {
        Ok(Self {
            identifier: row.require_string(attr::IDENTIFIER)?.to_string(),
            entity_type: parse(row.require_string(attr::ENTITY_TYPE)?)?,
            shard_name: parse(row.require_string(attr::SHARD_NAME)?)?,
            created_at_secs: row.u64_attr(attr::CREATED_AT).unwrap_or(0),
            updated_at_secs: row.u64_attr(attr::UPDATED_AT).unwrap_or(0),
        })
    }

    /// Primary key of the directory row for `(identifier, entity_type)`.
    #[must_use]
    pub fn key(identifier: &str, entity_type: &EntityType) -> Item {
        item([
            (attr::IDENTIFIER, identifier),
            (attr::ENTITY_TYPE, entity_type.as_str()),
        ])
    }
}

fn parse<T>(raw: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = shardline_core::Error>,
{
    raw.parse()
        .map_err(|err: shardline_core::Error| StoreError::validation(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard() -> Shard {
        Shard {
            name: ShardName::new("bal_shard_1").unwrap(),
            entity_type: EntityType::new("userBalances").unwrap(),
            allocation_state: AllocationState::Disabled,
            created_at_secs: 10,
            updated_at_secs: 20,
        }
    }

    #[test]
    fn test_shard_item_layout() {
        let row = shard().to_item();
        assert_eq!(row.string_attr("shard_name"), Some("bal_shard_1"));
        assert_eq!(row.string_attr("allocation_state"), Some("disabled"));
        assert_eq!(row.u64_attr("updated_at"), Some(20));
        assert_eq!(Shard::from_item(&row).unwrap(), shard());
    }

    #[test]
    fn test_shard_rejects_unknown_state() {
        let mut row = shard().to_item();
        row.insert("allocation_state".to_string(), AttributeValue::s("paused"));
        assert!(matches!(
            Shard::from_item(&row),
            Err(StoreError::Validation { .. })
        ));
    }

    #[test]
    fn test_assignment_key() {
        let entity_type = EntityType::new("userBalances").unwrap();
        let key = Assignment::key("0xabc", &entity_type);
        assert_eq!(key.len(), 2);
        assert_eq!(key.string_attr("identifier"), Some("0xabc"));
        assert_eq!(key.string_attr("entity_type"), Some("userBalances"));
    }

    #[test]
    fn test_shard_cache_encoding() {
        let json = serde_json::to_string(&shard()).unwrap();
        assert!(json.contains("\"allocation_state\":\"disabled\""));
        let back: Shard = serde_json::from_str(&json).unwrap();
        assert_eq!(back, shard());
    }
}
