//! Shared fixtures for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use shardline_cache::InMemoryCacheBackend;
use shardline_core::{EntityType, ShardName, ShardlineConfig};
use shardline_store::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, DeleteItemRequest,
    GetItemRequest, Item, ItemExecutor, ItemStore, Page, PutItemRequest, QueryRequest,
    ScanRequest, SimulatedItemStore, StoreResult, UpdateItemRequest,
};

use crate::directory::ShardDirectory;
use crate::registry::ShardRegistry;
use crate::tables::{assignment_table_schema, registry_table_schema};

pub(crate) struct Fixture {
    pub(crate) registry: ShardRegistry<SimulatedItemStore, InMemoryCacheBackend>,
    pub(crate) directory: ShardDirectory<SimulatedItemStore, InMemoryCacheBackend>,
    pub(crate) store: SimulatedItemStore,
    pub(crate) cache: Arc<InMemoryCacheBackend>,
}

pub(crate) fn fixture() -> Fixture {
    let config = ShardlineConfig::for_testing();
    let store = SimulatedItemStore::new(7);
    store.create_table(registry_table_schema(&config.tables));
    store.create_table(assignment_table_schema(&config.tables));

    let cache = Arc::new(InMemoryCacheBackend::new());
    let registry = ShardRegistry::new(
        ItemExecutor::new(store.clone(), config.retry),
        cache.clone(),
        config.cache,
        config.tables,
    );
    Fixture {
        directory: ShardDirectory::new(registry.clone()),
        registry,
        store,
        cache,
    }
}

pub(crate) fn entity() -> EntityType {
    EntityType::new("userBalances").unwrap()
}

pub(crate) fn shard_name(name: &str) -> ShardName {
    ShardName::new(name).unwrap()
}

/// Yields until a detached cache population has landed.
pub(crate) async fn settle(cache: &InMemoryCacheBackend, key: &str) {
    for _ in 0..100 {
        if cache.contains_key(key) {
            return;
        }
        tokio::task::yield_now().await;
    }
}

/// Simulated store that yields to the scheduler before every call, so
/// concurrent operations interleave between their reads and writes.
#[derive(Clone)]
pub(crate) struct YieldingStore(pub(crate) SimulatedItemStore);

#[async_trait]
impl ItemStore for YieldingStore {
    async fn get_item(&self, request: &GetItemRequest) -> StoreResult<Option<Item>> {
        tokio::task::yield_now().await;
        self.0.get_item(request).await
    }

    async fn put_item(&self, request: &PutItemRequest) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.put_item(request).await
    }

    async fn update_item(&self, request: &UpdateItemRequest) -> StoreResult<Item> {
        tokio::task::yield_now().await;
        self.0.update_item(request).await
    }

    async fn delete_item(&self, request: &DeleteItemRequest) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.delete_item(request).await
    }

    async fn query(&self, request: &QueryRequest) -> StoreResult<Page> {
        tokio::task::yield_now().await;
        self.0.query(request).await
    }

    async fn scan(&self, request: &ScanRequest) -> StoreResult<Page> {
        tokio::task::yield_now().await;
        self.0.scan(request).await
    }

    async fn batch_get_item(&self, request: &BatchGetRequest) -> StoreResult<BatchGetOutput> {
        tokio::task::yield_now().await;
        self.0.batch_get_item(request).await
    }

    async fn batch_write_item(&self, request: &BatchWriteRequest) -> StoreResult<BatchWriteOutput> {
        tokio::task::yield_now().await;
        self.0.batch_write_item(request).await
    }
}

/// Directory over a [`YieldingStore`], plus the inner simulated store.
pub(crate) fn yielding_directory() -> (
    ShardDirectory<YieldingStore, InMemoryCacheBackend>,
    SimulatedItemStore,
) {
    let config = ShardlineConfig::for_testing();
    let store = SimulatedItemStore::new(7);
    store.create_table(registry_table_schema(&config.tables));
    store.create_table(assignment_table_schema(&config.tables));

    let registry = ShardRegistry::new(
        ItemExecutor::new(YieldingStore(store.clone()), config.retry),
        Arc::new(InMemoryCacheBackend::new()),
        config.cache,
        config.tables,
    );
    (ShardDirectory::new(registry), store)
}
