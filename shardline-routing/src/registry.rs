//! Shard registry.
//!
//! The registry is the set of physical shards per entity type, each with an
//! allocation state. Rows are created by operators and toggled between
//! `Enabled` and `Disabled`; they are never deleted here.
//!
//! Uniqueness of a shard name rests on a conditional put, so two operators
//! racing to add the same shard cannot both succeed.

use std::collections::HashMap;
use std::sync::Arc;

use shardline_cache::{CacheAside, CacheBackend};
use shardline_core::{
    current_timestamp_secs, AllocationFilter, AllocationState, CacheConfig, EntityType,
    ShardName, TableConfig,
};
use shardline_store::{
    Condition, GetItemRequest, ItemExecutor, ItemStore, PutItemRequest, UpdateAction,
    UpdateItemRequest,
};
use tracing::{debug, info};

use crate::error::{RoutingError, RoutingResult};
use crate::lookup::{ShardListingLookup, ShardLookup};
use crate::model::{attr, Shard};

/// Result of [`ShardRegistry::configure_shard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// The shard was already in the requested state; nothing was written.
    Unchanged,
    /// The state was written and cached listings were invalidated.
    Updated,
}

/// Registry of physical shards.
///
/// Cloning is cheap; clones share the backend and the cache.
pub struct ShardRegistry<S: ItemStore, C: CacheBackend> {
    /// Retrying executor over the item store.
    executor: ItemExecutor<S>,
    /// Cache backend for lookups.
    cache: Arc<C>,
    /// Cache key prefix and TTLs.
    cache_config: CacheConfig,
    /// Table names.
    tables: TableConfig,
}

impl<S: ItemStore, C: CacheBackend> Clone for ShardRegistry<S, C> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            cache: self.cache.clone(),
            cache_config: self.cache_config.clone(),
            tables: self.tables.clone(),
        }
    }
}

impl<S, C> ShardRegistry<S, C>
where
    S: ItemStore + 'static,
    C: CacheBackend + 'static,
{
    /// Creates a registry.
    #[must_use]
    pub const fn new(
        executor: ItemExecutor<S>,
        cache: Arc<C>,
        cache_config: CacheConfig,
        tables: TableConfig,
    ) -> Self {
        Self {
            executor,
            cache,
            cache_config,
            tables,
        }
    }

    /// Returns the executor.
    #[must_use]
    pub const fn executor(&self) -> &ItemExecutor<S> {
        &self.executor
    }

    /// Returns the cache backend.
    #[must_use]
    pub const fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// Returns the cache configuration.
    #[must_use]
    pub const fn cache_config(&self) -> &CacheConfig {
        &self.cache_config
    }

    /// Returns the table names.
    #[must_use]
    pub const fn tables(&self) -> &TableConfig {
        &self.tables
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Registers a new shard in the `Disabled` state.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateShard` if the name is taken, or a store/cache error.
    pub async fn add_shard(
        &self,
        name: &ShardName,
        entity_type: &EntityType,
    ) -> RoutingResult<Shard> {
        let now = current_timestamp_secs();
        let shard = Shard {
            name: name.clone(),
            entity_type: entity_type.clone(),
            allocation_state: AllocationState::Disabled,
            created_at_secs: now,
            updated_at_secs: now,
        };

        let request = PutItemRequest::new(&self.tables.shard_registry, shard.to_item())
            .with_condition(Condition::not_exists(attr::SHARD_NAME));
        match self.executor.put_item(&request).await {
            Ok(()) => {}
            Err(err) if err.is_conditional_check_failed() => {
                return Err(RoutingError::DuplicateShard {
                    name: name.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }
        info!(shard = %name, entity_type = %entity_type, "Shard added");

        self.listing(
            entity_type,
            vec![
                AllocationFilter::Only(AllocationState::Disabled),
                AllocationFilter::All,
            ],
        )
        .clear()
        .await?;
        Ok(shard)
    }

    /// Sets the allocation state of a shard.
    ///
    /// Requesting the state the shard already has writes nothing and leaves
    /// the cache alone.
    ///
    /// # Errors
    ///
    /// Returns `ShardNotFound` if the shard does not exist, or a store/cache
    /// error.
    pub async fn configure_shard(
        &self,
        name: &ShardName,
        state: AllocationState,
    ) -> RoutingResult<ConfigureOutcome> {
        let current = self
            .read_shard(name)
            .await?
            .ok_or_else(|| RoutingError::ShardNotFound {
                name: name.to_string(),
            })?;
        if current.allocation_state == state {
            debug!(shard = %name, state = %state, "Shard already in requested state");
            return Ok(ConfigureOutcome::Unchanged);
        }

        let request = UpdateItemRequest::new(
            &self.tables.shard_registry,
            Shard::key(name),
            vec![
                UpdateAction::set(attr::ALLOCATION_STATE, state.as_str()),
                UpdateAction::set(attr::UPDATED_AT, current_timestamp_secs()),
            ],
        )
        .with_condition(Condition::exists(attr::SHARD_NAME));
        match self.executor.update_item(&request).await {
            Ok(_) => {}
            Err(err) if err.is_conditional_check_failed() => {
                return Err(RoutingError::ShardNotFound {
                    name: name.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }
        info!(
            shard = %name,
            from = %current.allocation_state,
            to = %state,
            "Shard allocation state changed"
        );

        self.listing(
            &current.entity_type,
            AllocationState::ALL
                .into_iter()
                .map(AllocationFilter::Only)
                .chain([AllocationFilter::All])
                .collect(),
        )
        .clear()
        .await?;
        self.by_name(vec![name.clone()]).clear().await?;
        Ok(ConfigureOutcome::Updated)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Looks up one shard, through the cache.
    ///
    /// # Errors
    ///
    /// Returns `ShardNotFound` if no such shard exists, or a store error.
    pub async fn get_shard_by_name(&self, name: &ShardName) -> RoutingResult<Shard> {
        self.by_name(vec![name.clone()])
            .fetch()
            .await?
            .remove(name)
            .ok_or_else(|| RoutingError::ShardNotFound {
                name: name.to_string(),
            })
    }

    /// Probes which of `names` exist. Absent shards map to `false`.
    ///
    /// # Errors
    ///
    /// Returns a store error, or `Incomplete` if part of the probe was never
    /// serviced.
    pub async fn has_shard(&self, names: &[ShardName]) -> RoutingResult<HashMap<ShardName, bool>> {
        let mut unique = names.to_vec();
        unique.sort();
        unique.dedup();

        let found = self.by_name(unique.clone()).fetch().await?;
        Ok(unique
            .into_iter()
            .map(|name| {
                let exists = found.contains_key(&name);
                (name, exists)
            })
            .collect())
    }

    /// Lists the shards of an entity type passing `filter`, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn list_shards_by_entity_allocation(
        &self,
        entity_type: &EntityType,
        filter: AllocationFilter,
    ) -> RoutingResult<Vec<Shard>> {
        Ok(self
            .listing(entity_type, vec![filter])
            .fetch()
            .await?
            .remove(&filter)
            .unwrap_or_default())
    }

    /// Reads a shard row straight from the store, bypassing the cache.
    async fn read_shard(&self, name: &ShardName) -> RoutingResult<Option<Shard>> {
        let request = GetItemRequest::new(&self.tables.shard_registry, Shard::key(name)).consistent();
        match self.executor.get_item(&request).await? {
            Some(row) => Ok(Some(Shard::from_item(&row)?)),
            None => Ok(None),
        }
    }

    fn by_name(&self, names: Vec<ShardName>) -> ShardLookup<'_, S, C> {
        ShardLookup {
            registry: self,
            names,
        }
    }

    fn listing<'a>(
        &'a self,
        entity_type: &'a EntityType,
        filters: Vec<AllocationFilter>,
    ) -> ShardListingLookup<'a, S, C> {
        ShardListingLookup {
            registry: self,
            entity_type,
            filters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{entity, fixture, settle, shard_name, Fixture};

    #[tokio::test]
    async fn test_add_shard_starts_disabled() {
        let Fixture { registry, .. } = fixture();
        let shard = registry
            .add_shard(&shard_name("bal_shard_1"), &entity())
            .await
            .unwrap();
        assert_eq!(shard.allocation_state, AllocationState::Disabled);

        let fetched = registry
            .get_shard_by_name(&shard_name("bal_shard_1"))
            .await
            .unwrap();
        assert_eq!(fetched, shard);
    }

    #[tokio::test]
    async fn test_duplicate_shard() {
        let Fixture { registry, .. } = fixture();
        let name = shard_name("bal_shard_1");
        registry.add_shard(&name, &entity()).await.unwrap();
        let err = registry.add_shard(&name, &entity()).await.unwrap_err();
        assert!(matches!(err, RoutingError::DuplicateShard { .. }));
    }

    #[tokio::test]
    async fn test_get_missing_shard() {
        let Fixture { registry, .. } = fixture();
        let err = registry
            .get_shard_by_name(&shard_name("nope_shard"))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::ShardNotFound { .. }));
    }

    #[tokio::test]
    async fn test_configure_is_idempotent() {
        let Fixture { registry, store, .. } = fixture();
        let name = shard_name("bal_shard_1");
        registry.add_shard(&name, &entity()).await.unwrap();

        let writes = store.write_count();
        assert_eq!(
            registry
                .configure_shard(&name, AllocationState::Enabled)
                .await
                .unwrap(),
            ConfigureOutcome::Updated
        );
        assert_eq!(
            registry
                .configure_shard(&name, AllocationState::Enabled)
                .await
                .unwrap(),
            ConfigureOutcome::Unchanged
        );
        assert_eq!(store.write_count() - writes, 1);
    }

    #[tokio::test]
    async fn test_configure_missing_shard() {
        let Fixture { registry, .. } = fixture();
        let err = registry
            .configure_shard(&shard_name("nope_shard"), AllocationState::Enabled)
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::ShardNotFound { .. }));
    }

    #[tokio::test]
    async fn test_configure_invalidates_cached_views() {
        let Fixture {
            registry, cache, ..
        } = fixture();
        let name = shard_name("bal_shard_1");
        registry.add_shard(&name, &entity()).await.unwrap();

        let enabled = AllocationFilter::Only(AllocationState::Enabled);
        assert!(registry
            .list_shards_by_entity_allocation(&entity(), enabled)
            .await
            .unwrap()
            .is_empty());
        registry.get_shard_by_name(&name).await.unwrap();
        settle(&cache, "sl:shard:bal_shard_1").await;
        settle(&cache, "sl:shards:userBalances:enabled").await;

        registry
            .configure_shard(&name, AllocationState::Enabled)
            .await
            .unwrap();
        assert!(!cache.contains_key("sl:shard:bal_shard_1"));
        assert!(!cache.contains_key("sl:shards:userBalances:enabled"));

        let listed = registry
            .list_shards_by_entity_allocation(&entity(), enabled)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_enabled());
        assert!(registry.get_shard_by_name(&name).await.unwrap().is_enabled());
    }

    #[tokio::test]
    async fn test_has_shard() {
        let Fixture { registry, .. } = fixture();
        registry
            .add_shard(&shard_name("bal_shard_1"), &entity())
            .await
            .unwrap();

        let probe = registry
            .has_shard(&[
                shard_name("bal_shard_1"),
                shard_name("bal_shard_9"),
                shard_name("bal_shard_1"),
            ])
            .await
            .unwrap();
        assert_eq!(probe.len(), 2);
        assert!(probe[&shard_name("bal_shard_1")]);
        assert!(!probe[&shard_name("bal_shard_9")]);
    }

    #[tokio::test]
    async fn test_listing_filters_and_order() {
        let Fixture { registry, .. } = fixture();
        for name in ["shard_c", "shard_a", "shard_b"] {
            registry.add_shard(&shard_name(name), &entity()).await.unwrap();
        }
        let other = EntityType::new("orders").unwrap();
        registry.add_shard(&shard_name("orders_1"), &other).await.unwrap();
        registry
            .configure_shard(&shard_name("shard_b"), AllocationState::Enabled)
            .await
            .unwrap();

        let all = registry
            .list_shards_by_entity_allocation(&entity(), AllocationFilter::All)
            .await
            .unwrap();
        let names: Vec<&str> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["shard_a", "shard_b", "shard_c"]);

        let disabled = registry
            .list_shards_by_entity_allocation(
                &entity(),
                AllocationFilter::Only(AllocationState::Disabled),
            )
            .await
            .unwrap();
        assert_eq!(disabled.len(), 2);
        assert!(disabled.iter().all(|s| !s.is_enabled()));
    }
}
