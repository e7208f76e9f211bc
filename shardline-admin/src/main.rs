//! Shardline operator CLI.
//!
//! Registers shards, toggles their allocation state, assigns identifiers and
//! reads or adjusts balances. Results are printed to stdout as JSON; logs go
//! to stderr.
//!
//! # In-Memory Backend
//!
//! By default every invocation runs against a fresh simulated store, which
//! is mostly useful for `demo`:
//!
//! ```bash
//! shardline-admin demo --owner 0xabc --settled-delta 100
//! ```
//!
//! # DynamoDB Backend
//!
//! Built with `--features dynamodb`, the CLI talks to real tables. Table
//! creation is not handled here; region and endpoint come from
//! `SHARDLINE_DYNAMODB_*` variables.
//!
//! ```bash
//! shardline-admin --backend dynamodb add-shard --name bal_shard_1 --entity-type userBalances
//! shardline-admin --backend dynamodb configure-shard --name bal_shard_1 --state enabled
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use num_bigint::BigInt;
use shardline_core::{AllocationFilter, AllocationState, ShardlineConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Storage backend to run against.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum Backend {
    /// Fresh in-process simulated store.
    #[default]
    Memory,
    /// DynamoDB (requires the `dynamodb` feature).
    Dynamodb,
}

/// Shardline operator CLI.
#[derive(Parser, Debug)]
#[command(name = "shardline-admin")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Storage backend.
    #[arg(long, value_enum, default_value = "memory")]
    backend: Backend,

    /// TOML configuration file. Environment overrides apply on top.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Seed of the in-memory backend.
    #[arg(long, default_value = "42")]
    seed: u64,

    #[command(subcommand)]
    command: Command,
}

/// Operator actions.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Register a shard. New shards start disabled.
    AddShard {
        /// Shard (table) name.
        #[arg(long)]
        name: String,
        /// Entity type the shard stores.
        #[arg(long)]
        entity_type: String,
    },
    /// Set a shard's allocation state.
    ConfigureShard {
        /// Shard name.
        #[arg(long)]
        name: String,
        /// `enabled` or `disabled`.
        #[arg(long)]
        state: AllocationState,
    },
    /// Assign an identifier to a shard.
    AssignShard {
        /// Identifier to assign.
        #[arg(long)]
        identifier: String,
        /// Entity type of the identifier.
        #[arg(long)]
        entity_type: String,
        /// Target shard.
        #[arg(long)]
        shard: String,
        /// Allow disabled shards and re-pointing.
        #[arg(long)]
        force: bool,
    },
    /// List the shards of an entity type.
    ListShards {
        /// Entity type.
        #[arg(long)]
        entity_type: String,
        /// `all`, `enabled` or `disabled`.
        #[arg(long, default_value = "all")]
        filter: AllocationFilter,
    },
    /// Read balances of one asset on one shard.
    GetBalance {
        /// Shard holding the owners.
        #[arg(long)]
        shard: String,
        /// Asset address.
        #[arg(long)]
        asset: String,
        /// Owner address; repeat for several owners.
        #[arg(long = "owner", required = true)]
        owners: Vec<String>,
    },
    /// Apply settled and unsettled deltas to a balance.
    UpdateBalance {
        /// Owner address.
        #[arg(long)]
        owner: String,
        /// Asset address.
        #[arg(long)]
        asset: String,
        /// Settled delta.
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        settled_delta: BigInt,
        /// Unsettled delta.
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        unsettled_delta: BigInt,
    },
    /// Walk a shard from registration to a balance read on the memory backend.
    Demo {
        /// Owner to credit.
        #[arg(long, default_value = "0xabc")]
        owner: String,
        /// Asset address.
        #[arg(long, default_value = "0xerc20")]
        asset: String,
        /// Amount credited.
        #[arg(long, default_value = "100", allow_hyphen_values = true)]
        settled_delta: BigInt,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ShardlineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => ShardlineConfig::from_file(path)?,
        None => ShardlineConfig::default(),
    }
    .with_env_overrides()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(args.config.as_ref())?;
    info!(
        backend = ?args.backend,
        command = ?args.command,
        key_prefix = %config.cache.key_prefix,
        "Starting shardline-admin"
    );

    let output = match args.backend {
        Backend::Memory => {
            let services = commands::Services::in_memory(&config, args.seed)?;
            services.run(args.command).await?
        }
        Backend::Dynamodb => dynamodb_run(&config, args.command).await?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(feature = "dynamodb")]
async fn dynamodb_run(
    config: &ShardlineConfig,
    command: Command,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    use shardline_store::{DynamoDbConfig, DynamoDbItemStore};

    let store = DynamoDbItemStore::new(DynamoDbConfig::from_env()?).await;
    let services = commands::Services::new(store, config, None)?;
    services.run(command).await
}

#[cfg(not(feature = "dynamodb"))]
async fn dynamodb_run(
    _config: &ShardlineConfig,
    _command: Command,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    Err("the dynamodb backend requires building with --features dynamodb".into())
}
