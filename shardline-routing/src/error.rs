//! Routing error types.

use shardline_cache::CacheError;
use shardline_core::ErrorKind;
use shardline_store::StoreError;
use thiserror::Error;

/// Result type for registry and directory operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors raised by the shard registry and directory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// A shard with this name is already registered.
    #[error("shard already exists: {name}")]
    DuplicateShard {
        /// The shard name.
        name: String,
    },

    /// No shard is registered under this name.
    #[error("shard not found: {name}")]
    ShardNotFound {
        /// The shard name.
        name: String,
    },

    /// An assignment request broke a routing rule.
    #[error("invalid assignment for {identifier}: {reason}")]
    InvalidAssignment {
        /// The identifier being assigned.
        identifier: String,
        /// The rule that was broken.
        reason: String,
    },

    /// The entity type has no shard open for allocation.
    #[error("no shard available for allocation of {entity_type}")]
    NoAvailableShard {
        /// The entity type.
        entity_type: String,
    },

    /// A batched read left keys unprocessed after the retry budget.
    #[error("{unprocessed} keys left unprocessed on table {table}")]
    Incomplete {
        /// The table read.
        table: String,
        /// Keys never serviced.
        unprocessed: usize,
    },

    /// A name or label failed validation.
    #[error(transparent)]
    InvalidArgument(#[from] shardline_core::Error),

    /// The item store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The cache failed while invalidating.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl RoutingError {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateShard { .. } => ErrorKind::ConditionalCheckFailed,
            Self::ShardNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidAssignment { .. }
            | Self::NoAvailableShard { .. }
            | Self::InvalidArgument(_) => ErrorKind::Validation,
            Self::Incomplete { .. } => ErrorKind::Throughput,
            Self::Store(err) => err.kind(),
            Self::Cache(err) => err.kind(),
        }
    }

    pub(crate) fn invalid_assignment(identifier: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAssignment {
            identifier: identifier.to_string(),
            reason: reason.into(),
        }
    }
}
