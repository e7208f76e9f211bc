//! Cache-aside reads over the registry and the directory.
//!
//! Three cache classes live here:
//!
//! - `shard`: one registry row by name, shared by name lookups and
//!   existence probes
//! - `shards`: the listing of an entity type under one allocation filter
//! - `assignment`: one directory row by `(entity_type, identifier)`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shardline_cache::{cache_key, CacheAside, CacheBackend};
use shardline_core::limits::BATCH_GET_KEYS_MAX;
use shardline_core::{AllocationFilter, EntityType, ShardName};
use shardline_store::{BatchGetRequest, Item, ItemExecutor, ItemStore, QueryRequest, StoreResult};

use crate::error::{RoutingError, RoutingResult};
use crate::model::{attr, Assignment, Shard};
use crate::registry::ShardRegistry;

const SHARD_CLASS: &str = "shard";
const LISTING_CLASS: &str = "shards";
const ASSIGNMENT_CLASS: &str = "assignment";

/// Reads `keys` from `table` in ceiling-sized batches.
///
/// A residue left after the retry budget fails the whole read.
pub(crate) async fn batch_read<S: ItemStore>(
    executor: &ItemExecutor<S>,
    table: &str,
    keys: Vec<Item>,
) -> RoutingResult<Vec<Item>> {
    let mut rows = Vec::with_capacity(keys.len());
    for chunk in keys.chunks(BATCH_GET_KEYS_MAX) {
        let request = BatchGetRequest::new().with_keys(table, chunk.to_vec());
        let mut outcome = executor.batch_get(request).await?;
        if !outcome.is_complete() {
            return Err(RoutingError::Incomplete {
                table: table.to_string(),
                unprocessed: outcome.unprocessed_count(),
            });
        }
        rows.extend(outcome.items.remove(table).unwrap_or_default());
    }
    Ok(rows)
}

// -----------------------------------------------------------------------------
// Shards by name
// -----------------------------------------------------------------------------

pub(crate) struct ShardLookup<'a, S: ItemStore, C: CacheBackend> {
    pub(crate) registry: &'a ShardRegistry<S, C>,
    pub(crate) names: Vec<ShardName>,
}

#[async_trait]
impl<'a, S, C> CacheAside for ShardLookup<'a, S, C>
where
    S: ItemStore + 'static,
    C: CacheBackend + 'static,
{
    type Id = ShardName;
    type Value = Shard;
    type Error = RoutingError;
    type Backend = C;

    fn cache_key_map(&self) -> Vec<(ShardName, String)> {
        let prefix = &self.registry.cache_config().key_prefix;
        self.names
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    cache_key(prefix, SHARD_CLASS, &[name.as_str()]),
                )
            })
            .collect()
    }

    fn expiry(&self) -> Duration {
        self.registry.cache_config().registry_ttl()
    }

    fn backend(&self) -> Arc<C> {
        self.registry.cache().clone()
    }

    async fn fetch_from_source(
        &self,
        missing: &[ShardName],
    ) -> RoutingResult<HashMap<ShardName, Shard>> {
        let table = &self.registry.tables().shard_registry;
        let keys = missing.iter().map(Shard::key).collect();
        let rows = batch_read(self.registry.executor(), table, keys).await?;
        let mut found = HashMap::with_capacity(rows.len());
        for row in &rows {
            let shard = Shard::from_item(row)?;
            found.insert(shard.name.clone(), shard);
        }
        Ok(found)
    }
}

// -----------------------------------------------------------------------------
// Listings
// -----------------------------------------------------------------------------

pub(crate) struct ShardListingLookup<'a, S: ItemStore, C: CacheBackend> {
    pub(crate) registry: &'a ShardRegistry<S, C>,
    pub(crate) entity_type: &'a EntityType,
    pub(crate) filters: Vec<AllocationFilter>,
}

impl<S: ItemStore + 'static, C: CacheBackend + 'static> ShardListingLookup<'_, S, C> {
    fn query(&self, filter: AllocationFilter) -> QueryRequest {
        let tables = self.registry.tables();
        let query = QueryRequest::new(&tables.shard_registry);
        match filter {
            AllocationFilter::All => query
                .on_index(&tables.entity_index)
                .key_eq(attr::ENTITY_TYPE, self.entity_type.as_str()),
            AllocationFilter::Only(state) => query
                .on_index(&tables.entity_allocation_index)
                .key_eq(attr::ENTITY_TYPE, self.entity_type.as_str())
                .key_eq(attr::ALLOCATION_STATE, state.as_str()),
        }
    }
}

#[async_trait]
impl<'a, S, C> CacheAside for ShardListingLookup<'a, S, C>
where
    S: ItemStore + 'static,
    C: CacheBackend + 'static,
{
    type Id = AllocationFilter;
    type Value = Vec<Shard>;
    type Error = RoutingError;
    type Backend = C;

    fn cache_key_map(&self) -> Vec<(AllocationFilter, String)> {
        let prefix = &self.registry.cache_config().key_prefix;
        self.filters
            .iter()
            .map(|&filter| {
                (
                    filter,
                    cache_key(
                        prefix,
                        LISTING_CLASS,
                        &[self.entity_type.as_str(), filter.as_str()],
                    ),
                )
            })
            .collect()
    }

    fn expiry(&self) -> Duration {
        self.registry.cache_config().registry_ttl()
    }

    fn backend(&self) -> Arc<C> {
        self.registry.cache().clone()
    }

    async fn fetch_from_source(
        &self,
        missing: &[AllocationFilter],
    ) -> RoutingResult<HashMap<AllocationFilter, Vec<Shard>>> {
        let mut found = HashMap::with_capacity(missing.len());
        for &filter in missing {
            let rows = self
                .registry
                .executor()
                .query_all(&self.query(filter))
                .await?;
            let mut shards = rows
                .iter()
                .map(Shard::from_item)
                .collect::<StoreResult<Vec<_>>>()?;
            shards.sort_by(|a, b| a.name.cmp(&b.name));
            found.insert(filter, shards);
        }
        Ok(found)
    }
}

// -----------------------------------------------------------------------------
// Assignments
// -----------------------------------------------------------------------------

pub(crate) struct AssignmentLookup<'a, S: ItemStore, C: CacheBackend> {
    pub(crate) registry: &'a ShardRegistry<S, C>,
    pub(crate) entity_type: &'a EntityType,
    pub(crate) identifiers: Vec<String>,
}

#[async_trait]
impl<'a, S, C> CacheAside for AssignmentLookup<'a, S, C>
where
    S: ItemStore + 'static,
    C: CacheBackend + 'static,
{
    type Id = String;
    type Value = Assignment;
    type Error = RoutingError;
    type Backend = C;

    fn cache_key_map(&self) -> Vec<(String, String)> {
        let prefix = &self.registry.cache_config().key_prefix;
        self.identifiers
            .iter()
            .map(|identifier| {
                (
                    identifier.clone(),
                    cache_key(
                        prefix,
                        ASSIGNMENT_CLASS,
                        &[self.entity_type.as_str(), identifier.as_str()],
                    ),
                )
            })
            .collect()
    }

    fn expiry(&self) -> Duration {
        self.registry.cache_config().directory_ttl()
    }

    fn backend(&self) -> Arc<C> {
        self.registry.cache().clone()
    }

    async fn fetch_from_source(
        &self,
        missing: &[String],
    ) -> RoutingResult<HashMap<String, Assignment>> {
        let table = &self.registry.tables().shard_assignments;
        let keys = missing
            .iter()
            .map(|identifier| Assignment::key(identifier, self.entity_type))
            .collect();
        let rows = batch_read(self.registry.executor(), table, keys).await?;
        let mut found = HashMap::with_capacity(rows.len());
        for row in &rows {
            let assignment = Assignment::from_item(row)?;
            found.insert(assignment.identifier.clone(), assignment);
        }
        Ok(found)
    }
}
