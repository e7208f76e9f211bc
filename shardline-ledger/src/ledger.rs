//! Balance ledger.
//!
//! Balances are keyed by `(owner_address, asset_address)` and live on the
//! shard the directory assigns to the owner. Consistency rests on
//! conditional atomic updates at the store; there are no in-process locks.
//!
//! # Write Path
//!
//! An update adds a settled delta and an unsettled delta, and adds their
//! difference to the pessimistic balance in the same request. When the
//! unsettled delta is positive the request is guarded by
//! `pessimistic_settled_balance >= delta_unsettled`, so a debit can never be
//! accepted against funds that are already spoken for.
//!
//! # Read Path
//!
//! Reads go through a per-owner cache. Misses are fetched in chunks, with at
//! most `concurrency` batch-gets in flight; each wave completes before the
//! next starts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use num_bigint::BigInt;
use num_traits::Signed;
use shardline_cache::{cache_key, CacheAside, CacheBackend};
use shardline_core::limits::BATCH_GET_KEYS_MAX;
use shardline_core::{current_timestamp_secs, EntityType, LedgerConfig, ShardName};
use shardline_routing::ShardDirectory;
use shardline_store::{
    AttributeValue, CompareOp, Condition, ItemStore, StoreError, TableSchema, UpdateAction,
};
use tracing::{debug, info, warn};

use crate::entity::ShardedEntity;
use crate::error::{LedgerError, LedgerResult};
use crate::record::{BalanceOverwrite, BalanceRecord, BalanceView};
use crate::schema::{attr, normalize_address, BalanceKey, BalanceSchema, ShardSchema};

const BALANCE_CLASS: &str = "balance";

/// Sharded balance ledger.
pub struct BalanceLedger<S: ItemStore, C: CacheBackend> {
    /// Balances as a sharded entity.
    entity: ShardedEntity<BalanceSchema, S, C>,
    /// Read fan-out.
    config: LedgerConfig,
}

impl<S, C> BalanceLedger<S, C>
where
    S: ItemStore + 'static,
    C: CacheBackend + 'static,
{
    /// Creates a ledger routing owners through `directory`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configured entity type is blank.
    pub fn new(directory: ShardDirectory<S, C>, config: LedgerConfig) -> LedgerResult<Self> {
        let entity_type = EntityType::new(config.entity_type.clone())?;
        Ok(Self {
            entity: ShardedEntity::new(BalanceSchema::new(entity_type), directory),
            config,
        })
    }

    /// Returns the underlying sharded entity.
    #[must_use]
    pub const fn entity(&self) -> &ShardedEntity<BalanceSchema, S, C> {
        &self.entity
    }

    /// Entity type balance owners are assigned under.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        self.entity.schema().entity_type()
    }

    /// Table layout of a balance shard.
    #[must_use]
    pub fn table_schema(&self, shard: &ShardName) -> TableSchema {
        self.entity.table_schema(shard)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Reads the balances of many owners of one asset on one shard.
    ///
    /// Owners are lower-cased and deduplicated; the result is keyed by the
    /// normalized address. Owners without a record read as zero.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAddress` for a blank address, `Incomplete` if part of
    /// the read was never serviced, or a store error.
    pub async fn get_balance(
        &self,
        shard: &ShardName,
        asset_address: &str,
        owner_addresses: &[String],
    ) -> LedgerResult<HashMap<String, BalanceView>> {
        let asset_address = normalize_address(asset_address)?;
        let mut owners = owner_addresses
            .iter()
            .map(|owner| normalize_address(owner))
            .collect::<LedgerResult<Vec<_>>>()?;
        owners.sort();
        owners.dedup();

        let mut found = self
            .balances(shard, &asset_address, owners.clone())
            .fetch()
            .await?;
        debug!(
            shard = %shard,
            asset = %asset_address,
            owners = owners.len(),
            found = found.len(),
            "Balances read"
        );

        Ok(owners
            .into_iter()
            .map(|owner| {
                let record = found.remove(&owner).unwrap_or_else(|| {
                    BalanceRecord::zero(&BalanceKey {
                        owner_address: owner.clone(),
                        asset_address: asset_address.clone(),
                    })
                });
                (owner, BalanceView::from(&record))
            })
            .collect())
    }

    /// Reads records straight from a shard in bounded waves.
    async fn read_records(
        &self,
        shard: &ShardName,
        asset_address: &str,
        owners: &[String],
    ) -> LedgerResult<HashMap<String, BalanceRecord>> {
        let chunk_size = self.config.chunk_size.clamp(1, BATCH_GET_KEYS_MAX);
        let concurrency = self.config.concurrency.max(1);
        let schema = self.entity.schema();

        let chunks: Vec<Vec<_>> = owners
            .chunks(chunk_size)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|owner| {
                        schema.item_key(&BalanceKey {
                            owner_address: owner.clone(),
                            asset_address: asset_address.to_string(),
                        })
                    })
                    .collect()
            })
            .collect();

        let mut found = HashMap::with_capacity(owners.len());
        for wave in chunks.chunks(concurrency) {
            let reads = wave
                .iter()
                .map(|keys| self.entity.batch_get(shard, keys.clone()));
            for outcome in join_all(reads).await {
                let mut outcome = outcome?;
                if !outcome.is_complete() {
                    warn!(
                        shard = %shard,
                        unprocessed = outcome.unprocessed_count(),
                        "Balance read left keys unprocessed"
                    );
                    return Err(LedgerError::Incomplete {
                        shard: shard.to_string(),
                        unprocessed: outcome.unprocessed_count(),
                    });
                }
                for row in outcome.items.remove(shard.as_str()).unwrap_or_default() {
                    let record = BalanceRecord::from_item(&row)?;
                    found.insert(record.owner_address.clone(), record);
                }
            }
        }
        Ok(found)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Applies balance deltas to an owner's record, resolving its shard.
    ///
    /// # Errors
    ///
    /// Returns `ConditionalCheckFailed` if a positive unsettled delta exceeds
    /// the pessimistic balance, a routing error, or a store error.
    pub async fn update(
        &self,
        owner_address: &str,
        asset_address: &str,
        delta_settled: &BigInt,
        delta_unsettled: &BigInt,
    ) -> LedgerResult<BalanceRecord> {
        let key = BalanceKey::new(owner_address, asset_address)?;
        let shard = self.entity.resolve_shard(&key).await?;
        self.apply_update(&shard, &key, delta_settled, delta_unsettled)
            .await
    }

    /// Applies balance deltas on an already-resolved shard.
    ///
    /// # Errors
    ///
    /// Same as [`BalanceLedger::update`], minus routing.
    pub async fn update_on_shard(
        &self,
        shard: &ShardName,
        owner_address: &str,
        asset_address: &str,
        delta_settled: &BigInt,
        delta_unsettled: &BigInt,
    ) -> LedgerResult<BalanceRecord> {
        let key = BalanceKey::new(owner_address, asset_address)?;
        self.apply_update(shard, &key, delta_settled, delta_unsettled)
            .await
    }

    async fn apply_update(
        &self,
        shard: &ShardName,
        key: &BalanceKey,
        delta_settled: &BigInt,
        delta_unsettled: &BigInt,
    ) -> LedgerResult<BalanceRecord> {
        let actions = vec![
            UpdateAction::add(attr::SETTLED_BALANCE, delta_settled.clone()),
            UpdateAction::add(attr::UNSETTLED_DEBITS, delta_unsettled.clone()),
            UpdateAction::add(
                attr::PESSIMISTIC_SETTLED_BALANCE,
                delta_settled - delta_unsettled,
            ),
            UpdateAction::set(attr::UPDATED_AT, current_timestamp_secs()),
        ];
        let condition = delta_unsettled.is_positive().then(|| {
            Condition::compare(
                attr::PESSIMISTIC_SETTLED_BALANCE,
                CompareOp::Ge,
                AttributeValue::from(delta_unsettled),
            )
        });

        let row = match self.entity.update(shard, key, actions, condition).await {
            Ok(row) => row,
            Err(StoreError::ConditionalCheckFailed { .. }) => {
                warn!(
                    shard = %shard,
                    owner = %key.owner_address,
                    asset = %key.asset_address,
                    delta_unsettled = %delta_unsettled,
                    "Balance update rejected: insufficient pessimistic balance"
                );
                return Err(LedgerError::ConditionalCheckFailed {
                    owner_address: key.owner_address.clone(),
                    asset_address: key.asset_address.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let record = BalanceRecord::from_item(&row)?;
        debug!(
            shard = %shard,
            owner = %key.owner_address,
            asset = %key.asset_address,
            delta_settled = %delta_settled,
            delta_unsettled = %delta_unsettled,
            "Balance updated"
        );

        self.clear_cached(shard, key).await?;
        Ok(record)
    }

    /// Overwrites fields of an owner's record, resolving its shard.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBalance` if the overwrite sets no field, a routing
    /// error, or a store error.
    pub async fn set(
        &self,
        owner_address: &str,
        asset_address: &str,
        overwrite: BalanceOverwrite,
    ) -> LedgerResult<BalanceRecord> {
        if overwrite.is_empty() {
            return Err(LedgerError::InvalidBalance {
                reason: "overwrite sets no field".to_string(),
            });
        }
        let key = BalanceKey::new(owner_address, asset_address)?;
        let shard = self.entity.resolve_shard(&key).await?;
        self.apply_set(&shard, &key, overwrite).await
    }

    /// Overwrites fields of a record on an already-resolved shard.
    ///
    /// # Errors
    ///
    /// Same as [`BalanceLedger::set`], minus routing.
    pub async fn set_on_shard(
        &self,
        shard: &ShardName,
        owner_address: &str,
        asset_address: &str,
        overwrite: BalanceOverwrite,
    ) -> LedgerResult<BalanceRecord> {
        if overwrite.is_empty() {
            return Err(LedgerError::InvalidBalance {
                reason: "overwrite sets no field".to_string(),
            });
        }
        let key = BalanceKey::new(owner_address, asset_address)?;
        self.apply_set(shard, &key, overwrite).await
    }

    async fn apply_set(
        &self,
        shard: &ShardName,
        key: &BalanceKey,
        overwrite: BalanceOverwrite,
    ) -> LedgerResult<BalanceRecord> {
        let overwrite = overwrite.with_derived_pessimistic();

        let mut actions = Vec::with_capacity(4);
        let fields = [
            (attr::SETTLED_BALANCE, &overwrite.settled_balance),
            (attr::UNSETTLED_DEBITS, &overwrite.unsettled_debits),
            (
                attr::PESSIMISTIC_SETTLED_BALANCE,
                &overwrite.pessimistic_settled_balance,
            ),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                actions.push(UpdateAction::set(name, AttributeValue::from(value)));
            }
        }
        actions.push(UpdateAction::set(attr::UPDATED_AT, current_timestamp_secs()));

        let row = self.entity.update(shard, key, actions, None).await?;
        let record = BalanceRecord::from_item(&row)?;
        info!(
            shard = %shard,
            owner = %key.owner_address,
            asset = %key.asset_address,
            settled = %record.settled_balance,
            unsettled = %record.unsettled_debits,
            "Balance overwritten"
        );
        if !record.is_consistent() {
            warn!(
                shard = %shard,
                owner = %key.owner_address,
                asset = %key.asset_address,
                pessimistic = %record.pessimistic_settled_balance,
                "Overwrite left pessimistic balance out of step with settled and unsettled"
            );
        }

        self.clear_cached(shard, key).await?;
        Ok(record)
    }

    async fn clear_cached(&self, shard: &ShardName, key: &BalanceKey) -> LedgerResult<()> {
        self.balances(shard, &key.asset_address, vec![key.owner_address.clone()])
            .clear()
            .await?;
        Ok(())
    }

    fn balances<'a>(
        &'a self,
        shard: &'a ShardName,
        asset_address: &'a str,
        owners: Vec<String>,
    ) -> BalanceLookup<'a, S, C> {
        BalanceLookup {
            ledger: self,
            shard,
            asset_address,
            owners,
        }
    }
}

// -----------------------------------------------------------------------------
// Cache-aside read
// -----------------------------------------------------------------------------

struct BalanceLookup<'a, S: ItemStore, C: CacheBackend> {
    ledger: &'a BalanceLedger<S, C>,
    shard: &'a ShardName,
    asset_address: &'a str,
    owners: Vec<String>,
}

#[async_trait]
impl<'a, S, C> CacheAside for BalanceLookup<'a, S, C>
where
    S: ItemStore + 'static,
    C: CacheBackend + 'static,
{
    type Id = String;
    type Value = BalanceRecord;
    type Error = LedgerError;
    type Backend = C;

    fn cache_key_map(&self) -> Vec<(String, String)> {
        let prefix = &self.ledger.entity.cache_config().key_prefix;
        self.owners
            .iter()
            .map(|owner| {
                (
                    owner.clone(),
                    cache_key(
                        prefix,
                        BALANCE_CLASS,
                        &[self.shard.as_str(), owner.as_str(), self.asset_address],
                    ),
                )
            })
            .collect()
    }

    fn expiry(&self) -> Duration {
        self.ledger.entity.cache_config().balance_ttl()
    }

    fn backend(&self) -> Arc<C> {
        self.ledger.entity.cache().clone()
    }

    async fn fetch_from_source(
        &self,
        missing: &[String],
    ) -> LedgerResult<HashMap<String, BalanceRecord>> {
        self.ledger
            .read_records(self.shard, self.asset_address, missing)
            .await
    }
}
