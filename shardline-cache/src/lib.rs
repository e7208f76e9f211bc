//! Shardline Cache - cache-aside reads over a pluggable cache backend.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Cache is an optimization**: a failing or corrupt cache degrades to a
//!   source read, never to an error
//! - **Write-through invalidation**: writers clear entries; readers repopulate
//! - **No unsafe code**: Safety > Performance
//!
//! # Backends
//!
//! - [`InMemoryCacheBackend`]: TTL map with fault injection for tests and
//!   single-process deployments

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod aside;
mod backend;
mod error;

pub use aside::{cache_key, CacheAside};
pub use backend::{CacheBackend, CacheFaultConfig, InMemoryCacheBackend};
pub use error::{CacheError, CacheResult};
