//! Shardline Store - keyed-item access with bounded retry.
//!
//! This crate provides the typed item model, the [`ItemStore`] backend trait
//! and the [`ItemExecutor`] that runs every logical operation against a
//! backend with linear backoff and batch residue reconciliation.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Deterministic testing**: `SimulatedItemStore` enables fault injection
//! - **Explicit limits**: batch ceilings are enforced before any I/O
//! - **Typed expressions**: conditions and updates are values, not strings
//! - **No unsafe code**: Safety > Performance
//!
//! # Storage Backends
//!
//! - [`SimulatedItemStore`]: In-memory tables with fault injection for tests
//! - `DynamoDbItemStore`: Production backend (behind `dynamodb` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use shardline_core::RetryConfig;
//! use shardline_store::{
//!     item, GetItemRequest, ItemExecutor, KeySchema, SimulatedItemStore, TableSchema,
//! };
//!
//! let store = SimulatedItemStore::new(42);
//! store.create_table(TableSchema::new("shard_registry", KeySchema::hash("shard_name")));
//!
//! let executor = ItemExecutor::new(store, RetryConfig::default());
//! let key = item([("shard_name", "bal_shard_1")]);
//! let shard = executor.get_item(&GetItemRequest::new("shard_registry", key)).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

#[cfg(feature = "dynamodb")]
mod dynamodb;
mod error;
mod executor;
mod expr;
mod item;
mod request;
mod schema;
mod simulated;
mod storage;

#[cfg(feature = "dynamodb")]
pub use dynamodb::{DynamoDbConfig, DynamoDbConfigError, DynamoDbItemStore};
pub use error::{StoreError, StoreResult};
pub use executor::{BatchGetOutcome, BatchWriteOutcome, ItemExecutor};
pub use expr::{CompareOp, Condition, UpdateAction};
pub use item::{item, AttributeValue, Item, ItemExt};
pub use request::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, DeleteItemRequest,
    GetItemRequest, Page, PutItemRequest, QueryRequest, ScanRequest, UpdateItemRequest,
    WriteRequest,
};
pub use schema::{IndexSchema, KeySchema, TableSchema};
pub use simulated::{ItemStoreFaultConfig, SimulatedItemStore};
pub use storage::ItemStore;

// Re-exported so callers can build numeric attributes without a direct dependency.
pub use num_bigint::BigInt;
