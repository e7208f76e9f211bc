//! Shardline Routing - shard registry, assignment directory and allocator.
//!
//! This crate maps a logical identifier of some entity type to the physical
//! shard (table) holding its records.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Deterministic placement**: first assignment hashes the identifier
//!   with a seedless xxh3 over name-ordered enabled shards
//! - **Conditional writes**: shard uniqueness is enforced by the store
//! - **Explicit invalidation**: every write clears the cache entries it
//!   makes stale
//! - **No unsafe code**: Safety > Performance
//!
//! # Example
//!
//! ```ignore
//! let registry = ShardRegistry::new(executor, cache, config.cache, config.tables);
//! registry.add_shard(&name, &entity_type).await?;
//! registry.configure_shard(&name, AllocationState::Enabled).await?;
//!
//! let directory = ShardDirectory::new(registry);
//! let shard = directory.resolve("0xabc", &entity_type).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod directory;
mod error;
mod hashing;
mod lookup;
mod model;
mod registry;
mod tables;
#[cfg(test)]
mod testing;

pub use directory::ShardDirectory;
pub use error::{RoutingError, RoutingResult};
pub use hashing::{allocation_index, big_int_hash};
pub use model::{attr, Assignment, Shard};
pub use registry::{ConfigureOutcome, ShardRegistry};
pub use tables::{assignment_table_schema, registry_table_schema};
