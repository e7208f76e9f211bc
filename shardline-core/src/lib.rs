//! Shardline Core - error taxonomy, typed identifiers and configuration.
//!
//! This crate holds the vocabulary shared by every other Shardline crate:
//! the error kinds callers branch on, the names of shards and entity types,
//! the backend limits the engine must respect, and the runtime configuration.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Strongly-typed names**: a `ShardName` cannot be passed where an
//!   `EntityType` is expected
//! - **Explicit limits**: every batch and fan-out has a bounded maximum
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
pub mod limits;
mod types;

pub use config::{
    CacheConfig, ConfigError, LedgerConfig, RetryConfig, ShardlineConfig, TableConfig,
};
pub use error::{Error, ErrorKind, Result};
pub use types::{current_timestamp_secs, AllocationFilter, AllocationState, EntityType, ShardName};
