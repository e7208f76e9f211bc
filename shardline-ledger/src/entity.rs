//! Sharded entities.
//!
//! [`ShardedEntity`] composes a [`ShardSchema`] with the shard directory and
//! the retrying executor: it resolves the shard of a key and runs item
//! operations against that shard's table. Domain types such as the balance
//! ledger are built on top of it rather than inheriting storage behavior.

use std::sync::Arc;

use shardline_cache::CacheBackend;
use shardline_core::{CacheConfig, ShardName};
use shardline_routing::{RoutingResult, ShardDirectory};
use shardline_store::{
    BatchGetOutcome, BatchGetRequest, Condition, Item, ItemExecutor, ItemStore, StoreResult,
    TableSchema, UpdateAction, UpdateItemRequest,
};

use crate::schema::ShardSchema;

/// A kind of record spread over the shards of one entity type.
pub struct ShardedEntity<P: ShardSchema, S: ItemStore, C: CacheBackend> {
    /// Layout of the entity.
    schema: P,
    /// Routing to shards.
    directory: ShardDirectory<S, C>,
}

impl<P, S, C> ShardedEntity<P, S, C>
where
    P: ShardSchema,
    S: ItemStore + 'static,
    C: CacheBackend + 'static,
{
    /// Creates a sharded entity.
    #[must_use]
    pub const fn new(schema: P, directory: ShardDirectory<S, C>) -> Self {
        Self { schema, directory }
    }

    /// Returns the layout.
    #[must_use]
    pub const fn schema(&self) -> &P {
        &self.schema
    }

    /// Returns the directory.
    #[must_use]
    pub const fn directory(&self) -> &ShardDirectory<S, C> {
        &self.directory
    }

    /// Returns the executor shared with the directory.
    #[must_use]
    pub fn executor(&self) -> &ItemExecutor<S> {
        self.directory.registry().executor()
    }

    /// Returns the cache backend shared with the directory.
    #[must_use]
    pub fn cache(&self) -> &Arc<C> {
        self.directory.registry().cache()
    }

    /// Returns the cache configuration.
    #[must_use]
    pub fn cache_config(&self) -> &CacheConfig {
        self.directory.registry().cache_config()
    }

    /// Table layout of one shard of this entity.
    #[must_use]
    pub fn table_schema(&self, shard: &ShardName) -> TableSchema {
        self.schema.table_schema(shard)
    }

    /// Finds the shard holding `key`, allocating one on first use.
    ///
    /// # Errors
    ///
    /// Returns a routing error.
    pub async fn resolve_shard(&self, key: &P::Key) -> RoutingResult<ShardName> {
        self.directory
            .resolve(self.schema.routing_identifier(key), self.schema.entity_type())
            .await
    }

    /// Reads many records of one shard.
    ///
    /// # Errors
    ///
    /// Returns a store error; a residue is reported in the outcome.
    pub async fn batch_get(
        &self,
        shard: &ShardName,
        keys: Vec<Item>,
    ) -> StoreResult<BatchGetOutcome> {
        self.executor()
            .batch_get(BatchGetRequest::new().with_keys(shard.as_str(), keys))
            .await
    }

    /// Applies update actions to one record and returns the stored result.
    ///
    /// # Errors
    ///
    /// Returns a store error, including `ConditionalCheckFailed` when
    /// `condition` does not hold.
    pub async fn update(
        &self,
        shard: &ShardName,
        key: &P::Key,
        actions: Vec<UpdateAction>,
        condition: Option<Condition>,
    ) -> StoreResult<Item> {
        let mut request =
            UpdateItemRequest::new(shard.as_str(), self.schema.item_key(key), actions);
        if let Some(condition) = condition {
            request = request.with_condition(condition);
        }
        self.executor().update_item(&request).await
    }
}
