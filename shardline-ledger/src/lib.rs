//! Shardline Ledger - sharded balances with conditional atomic updates.
//!
//! Balances are a [`ShardedEntity`]: records keyed by owner and asset,
//! spread over the shards the directory assigns to each owner. Every write
//! is a single conditional update at the store, so concurrent writers race
//! there and the condition decides.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Store-enforced invariants**: `pessimistic = settled - unsettled`
//!   moves in one atomic request
//! - **Bounded fan-out**: reads are chunked and issued in capped waves
//! - **Composition**: domain types wrap a sharded entity, they do not extend it
//! - **No unsafe code**: Safety > Performance
//!
//! # Example
//!
//! ```ignore
//! let ledger = BalanceLedger::new(directory, config.ledger)?;
//! ledger.update("0xabc", "0xerc20", &BigInt::from(100), &BigInt::from(0)).await?;
//! let balances = ledger.get_balance(&shard, "0xerc20", &["0xabc".to_string()]).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod entity;
mod error;
mod ledger;
mod record;
mod schema;

pub use entity::ShardedEntity;
pub use error::{LedgerError, LedgerResult};
pub use ledger::BalanceLedger;
pub use record::{BalanceOverwrite, BalanceRecord, BalanceView};
pub use schema::{attr, normalize_address, BalanceKey, BalanceSchema, ShardSchema};
