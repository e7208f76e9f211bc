//! Full Shardline stack over simulated backends.

use std::sync::Arc;

use shardline_cache::InMemoryCacheBackend;
use shardline_core::{AllocationState, EntityType, ShardName, ShardlineConfig};
use shardline_ledger::BalanceLedger;
use shardline_routing::{
    assignment_table_schema, registry_table_schema, ShardDirectory, ShardRegistry,
};
use shardline_store::{ItemExecutor, ItemStoreFaultConfig, SimulatedItemStore};

/// Registry, directory and ledger sharing one simulated store and cache.
pub struct Harness {
    /// Simulated item store; clones share state.
    pub store: SimulatedItemStore,
    /// In-memory cache.
    pub cache: Arc<InMemoryCacheBackend>,
    /// Configuration the stack was built with.
    pub config: ShardlineConfig,
    /// Shard registry.
    pub registry: ShardRegistry<SimulatedItemStore, InMemoryCacheBackend>,
    /// Shard directory.
    pub directory: ShardDirectory<SimulatedItemStore, InMemoryCacheBackend>,
    /// Balance ledger.
    pub ledger: BalanceLedger<SimulatedItemStore, InMemoryCacheBackend>,
}

impl Harness {
    /// Builds a fault-free stack with zero retry delays.
    ///
    /// # Panics
    ///
    /// Panics if the default ledger entity type is invalid.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, ShardlineConfig::for_testing(), ItemStoreFaultConfig::none())
    }

    /// Builds a stack with the given configuration and store faults.
    ///
    /// # Panics
    ///
    /// Panics if the configured ledger entity type is invalid.
    #[must_use]
    pub fn with_config(
        seed: u64,
        config: ShardlineConfig,
        faults: ItemStoreFaultConfig,
    ) -> Self {
        let store = SimulatedItemStore::with_faults(seed, faults);
        store.create_table(registry_table_schema(&config.tables));
        store.create_table(assignment_table_schema(&config.tables));

        let cache = Arc::new(InMemoryCacheBackend::new());
        let registry = ShardRegistry::new(
            ItemExecutor::new(store.clone(), config.retry.clone()),
            cache.clone(),
            config.cache.clone(),
            config.tables.clone(),
        );
        let directory = ShardDirectory::new(registry.clone());
        let ledger = BalanceLedger::new(directory.clone(), config.ledger.clone())
            .expect("ledger entity type must be valid");

        Self {
            store,
            cache,
            config,
            registry,
            directory,
            ledger,
        }
    }

    /// The ledger's entity type.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.ledger.entity_type().clone()
    }

    /// Registers, enables and creates the table of each named balance shard.
    ///
    /// # Panics
    ///
    /// Panics if a name is invalid or registration fails.
    pub async fn add_enabled_shards(&self, names: &[&str]) -> Vec<ShardName> {
        let entity_type = self.entity_type();
        let mut shards = Vec::with_capacity(names.len());
        for name in names {
            let shard = ShardName::new(*name).expect("valid shard name");
            self.registry
                .add_shard(&shard, &entity_type)
                .await
                .expect("add shard");
            self.registry
                .configure_shard(&shard, AllocationState::Enabled)
                .await
                .expect("enable shard");
            self.store.create_table(self.ledger.table_schema(&shard));
            shards.push(shard);
        }
        shards
    }

    /// Yields until a detached cache population for `key` has landed.
    pub async fn settle(&self, key: &str) {
        for _ in 0..100 {
            if self.cache.contains_key(key) {
                return;
            }
            tokio::task::yield_now().await;
        }
    }
}
