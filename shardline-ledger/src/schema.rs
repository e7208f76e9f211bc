//! Per-entity shard layout.
//!
//! A [`ShardSchema`] tells a [`ShardedEntity`](crate::ShardedEntity) what it
//! stores: the entity type routed through the directory, the table layout of
//! each shard, and how a logical key becomes a routing identifier and an item
//! key.

use shardline_core::{EntityType, ShardName};
use shardline_store::{item, Item, KeySchema, TableSchema};

use crate::error::{LedgerError, LedgerResult};

/// Layout of one kind of sharded entity.
pub trait ShardSchema: Send + Sync {
    /// Logical key of one record.
    type Key: Send + Sync;

    /// Entity type under which identifiers are assigned to shards.
    fn entity_type(&self) -> &EntityType;

    /// Table layout of a shard holding this entity.
    fn table_schema(&self, shard: &ShardName) -> TableSchema;

    /// The identifier the directory routes on.
    fn routing_identifier<'k>(&self, key: &'k Self::Key) -> &'k str;

    /// Primary key of the record for `key`.
    fn item_key(&self, key: &Self::Key) -> Item;
}

// -----------------------------------------------------------------------------
// Balances
// -----------------------------------------------------------------------------

/// Attribute names of a balance record.
pub mod attr {
    /// Owner address; hash key.
    pub const OWNER_ADDRESS: &str = "owner_address";
    /// Asset address; range key.
    pub const ASSET_ADDRESS: &str = "asset_address";
    /// Settled balance.
    pub const SETTLED_BALANCE: &str = "settled_balance";
    /// Outstanding debits not yet settled.
    pub const UNSETTLED_DEBITS: &str = "unsettled_debits";
    /// `settled_balance - unsettled_debits`, maintained on every write.
    pub const PESSIMISTIC_SETTLED_BALANCE: &str = "pessimistic_settled_balance";
    /// Last write time, Unix seconds.
    pub const UPDATED_AT: &str = "updated_at";
}

/// Key of a balance record. Addresses are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BalanceKey {
    /// Owner address.
    pub owner_address: String,
    /// Asset address.
    pub asset_address: String,
}

impl BalanceKey {
    /// Creates a key, normalizing both addresses.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` if either address is blank.
    pub fn new(owner_address: &str, asset_address: &str) -> LedgerResult<Self> {
        Ok(Self {
            owner_address: normalize_address(owner_address)?,
            asset_address: normalize_address(asset_address)?,
        })
    }
}

/// Lower-cases an address after rejecting blank input.
///
/// # Errors
///
/// Returns `InvalidAddress` if the address is blank or contains whitespace.
pub fn normalize_address(address: &str) -> LedgerResult<String> {
    if address.trim().is_empty() {
        return Err(LedgerError::InvalidAddress {
            address: address.to_string(),
            reason: "must not be empty",
        });
    }
    if address.chars().any(char::is_whitespace) {
        return Err(LedgerError::InvalidAddress {
            address: address.to_string(),
            reason: "must not contain whitespace",
        });
    }
    Ok(address.to_lowercase())
}

/// Layout of balance shards: hash `owner_address`, range `asset_address`.
#[derive(Debug, Clone)]
pub struct BalanceSchema {
    entity_type: EntityType,
}

impl BalanceSchema {
    /// Creates the schema for the given entity type.
    #[must_use]
    pub const fn new(entity_type: EntityType) -> Self {
        Self { entity_type }
    }
}

impl ShardSchema for BalanceSchema {
    type Key = BalanceKey;

    fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    fn table_schema(&self, shard: &ShardName) -> TableSchema {
        TableSchema::new(
            shard.as_str(),
            KeySchema::composite(attr::OWNER_ADDRESS, attr::ASSET_ADDRESS),
        )
    }

    fn routing_identifier<'k>(&self, key: &'k BalanceKey) -> &'k str {
        &key.owner_address
    }

    fn item_key(&self, key: &BalanceKey) -> Item {
        item([
            (attr::OWNER_ADDRESS, key.owner_address.as_str()),
            (attr::ASSET_ADDRESS, key.asset_address.as_str()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use shardline_store::ItemExt;

    use super::*;

    #[test]
    fn test_key_normalization() {
        let key = BalanceKey::new("0xABC", "0xErc20").unwrap();
        assert_eq!(key.owner_address, "0xabc");
        assert_eq!(key.asset_address, "0xerc20");
        assert!(matches!(
            BalanceKey::new("", "0xerc20"),
            Err(LedgerError::InvalidAddress { .. })
        ));
        assert!(BalanceKey::new("0x a", "0xerc20").is_err());
    }

    #[test]
    fn test_balance_layout() {
        let schema = BalanceSchema::new(EntityType::new("userBalances").unwrap());
        let shard = ShardName::new("bal_shard_1").unwrap();
        let table = schema.table_schema(&shard);
        assert_eq!(table.name, "bal_shard_1");
        assert_eq!(table.key.sort_key.as_deref(), Some("asset_address"));

        let key = BalanceKey::new("0xAbc", "0xerc20").unwrap();
        assert_eq!(schema.routing_identifier(&key), "0xabc");
        let row = schema.item_key(&key);
        assert_eq!(row.string_attr("owner_address"), Some("0xabc"));
        assert_eq!(row.len(), 2);
    }
}
