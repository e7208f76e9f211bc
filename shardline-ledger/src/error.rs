//! Ledger error types.

use shardline_cache::CacheError;
use shardline_core::ErrorKind;
use shardline_routing::RoutingError;
use shardline_store::StoreError;
use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors raised by the balance ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// A balance overwrite or delta was malformed.
    #[error("invalid balance: {reason}")]
    InvalidBalance {
        /// What was wrong.
        reason: String,
    },

    /// An owner or asset address was malformed.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// What was wrong.
        reason: &'static str,
    },

    /// The update would have pushed the pessimistic balance below zero.
    #[error("balance condition failed for {owner_address} / {asset_address}")]
    ConditionalCheckFailed {
        /// Owner address.
        owner_address: String,
        /// Asset address.
        asset_address: String,
    },

    /// A balance read left owners unprocessed after the retry budget.
    #[error("{unprocessed} balances left unread on shard {shard}")]
    Incomplete {
        /// The shard read.
        shard: String,
        /// Keys never serviced.
        unprocessed: usize,
    },

    /// The entity type label was invalid.
    #[error(transparent)]
    InvalidArgument(#[from] shardline_core::Error),

    /// Routing the owner to a shard failed.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// The item store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The cache failed while invalidating.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl LedgerError {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBalance { .. }
            | Self::InvalidAddress { .. }
            | Self::InvalidArgument(_) => ErrorKind::Validation,
            Self::ConditionalCheckFailed { .. } => ErrorKind::ConditionalCheckFailed,
            Self::Incomplete { .. } => ErrorKind::Throughput,
            Self::Routing(err) => err.kind(),
            Self::Store(err) => err.kind(),
            Self::Cache(err) => err.kind(),
        }
    }
}
