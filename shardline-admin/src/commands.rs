//! Command execution over wired-up services.

use std::sync::Arc;

use serde_json::{json, Value};
use shardline_cache::InMemoryCacheBackend;
use shardline_core::{AllocationState, EntityType, ShardName, ShardlineConfig};
use shardline_ledger::BalanceLedger;
use shardline_routing::{
    assignment_table_schema, registry_table_schema, ShardDirectory, ShardRegistry,
};
use shardline_store::{ItemExecutor, ItemStore, SimulatedItemStore};
use tracing::info;

use crate::Command;

type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Registry, directory and ledger over one store.
pub struct Services<S: ItemStore> {
    registry: ShardRegistry<S, InMemoryCacheBackend>,
    directory: ShardDirectory<S, InMemoryCacheBackend>,
    ledger: BalanceLedger<S, InMemoryCacheBackend>,
    /// Present on the memory backend, where shard tables are created on demand.
    simulated: Option<SimulatedItemStore>,
}

impl Services<SimulatedItemStore> {
    /// Wires services over a fresh simulated store with the registry tables
    /// already created.
    pub fn in_memory(config: &ShardlineConfig, seed: u64) -> CommandResult<Self> {
        let store = SimulatedItemStore::new(seed);
        store.create_table(registry_table_schema(&config.tables));
        store.create_table(assignment_table_schema(&config.tables));
        Self::new(store.clone(), config, Some(store))
    }
}

impl<S: ItemStore + 'static> Services<S> {
    /// Wires services over `store`.
    pub fn new(
        store: S,
        config: &ShardlineConfig,
        simulated: Option<SimulatedItemStore>,
    ) -> CommandResult<Self> {
        let registry = ShardRegistry::new(
            ItemExecutor::new(store, config.retry.clone()),
            Arc::new(InMemoryCacheBackend::new()),
            config.cache.clone(),
            config.tables.clone(),
        );
        let directory = ShardDirectory::new(registry.clone());
        let ledger = BalanceLedger::new(directory.clone(), config.ledger.clone())?;
        Ok(Self {
            registry,
            directory,
            ledger,
            simulated,
        })
    }

    /// Runs one command and returns its JSON output.
    pub async fn run(&self, command: Command) -> CommandResult<Value> {
        match command {
            Command::AddShard { name, entity_type } => {
                let name = ShardName::new(name)?;
                let shard = self
                    .registry
                    .add_shard(&name, &EntityType::new(entity_type)?)
                    .await?;
                self.bootstrap_shard(&name);
                Ok(serde_json::to_value(shard)?)
            }
            Command::ConfigureShard { name, state } => {
                let outcome = self
                    .registry
                    .configure_shard(&ShardName::new(name.clone())?, state)
                    .await?;
                Ok(json!({ "shard": name, "state": state, "outcome": format!("{outcome:?}") }))
            }
            Command::AssignShard {
                identifier,
                entity_type,
                shard,
                force,
            } => {
                let assignment = self
                    .directory
                    .assign_shard(
                        &identifier,
                        &EntityType::new(entity_type)?,
                        &ShardName::new(shard)?,
                        force,
                    )
                    .await?;
                Ok(serde_json::to_value(assignment)?)
            }
            Command::ListShards {
                entity_type,
                filter,
            } => {
                let shards = self
                    .registry
                    .list_shards_by_entity_allocation(&EntityType::new(entity_type)?, filter)
                    .await?;
                Ok(serde_json::to_value(shards)?)
            }
            Command::GetBalance {
                shard,
                asset,
                owners,
            } => {
                let balances = self
                    .ledger
                    .get_balance(&ShardName::new(shard)?, &asset, &owners)
                    .await?;
                Ok(serde_json::to_value(balances)?)
            }
            Command::UpdateBalance {
                owner,
                asset,
                settled_delta,
                unsettled_delta,
            } => {
                let record = self
                    .ledger
                    .update(&owner, &asset, &settled_delta, &unsettled_delta)
                    .await?;
                Ok(json!({
                    "owner_address": record.owner_address,
                    "asset_address": record.asset_address,
                    "settled_balance": record.settled_balance.to_string(),
                    "unsettled_debits": record.unsettled_debits.to_string(),
                    "pessimistic_settled_balance": record.pessimistic_settled_balance.to_string(),
                }))
            }
            Command::Demo {
                owner,
                asset,
                settled_delta,
            } => self.demo(&owner, &asset, &settled_delta).await,
        }
    }

    async fn demo(
        &self,
        owner: &str,
        asset: &str,
        settled_delta: &num_bigint::BigInt,
    ) -> CommandResult<Value> {
        let name = ShardName::new("bal_shard_1")?;
        let entity_type = self.ledger.entity_type().clone();

        self.registry.add_shard(&name, &entity_type).await?;
        self.bootstrap_shard(&name);
        self.registry
            .configure_shard(&name, AllocationState::Enabled)
            .await?;
        let assignment = self
            .directory
            .assign_shard(&owner.to_lowercase(), &entity_type, &name, false)
            .await?;
        info!(owner, shard = %assignment.shard_name, "Demo owner assigned");

        self.ledger
            .update(owner, asset, settled_delta, &num_bigint::BigInt::from(0))
            .await?;
        let balances = self
            .ledger
            .get_balance(&assignment.shard_name, asset, &[owner.to_string()])
            .await?;
        Ok(serde_json::to_value(balances)?)
    }

    /// Creates the balance table of a new shard on the memory backend.
    fn bootstrap_shard(&self, name: &ShardName) {
        if let Some(store) = &self.simulated {
            store.create_table(self.ledger.table_schema(name));
        }
    }
}
