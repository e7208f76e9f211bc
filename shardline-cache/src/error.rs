//! Cache error types.

use shardline_core::ErrorKind;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur while talking to the cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The cache backend failed or is unreachable.
    #[error("cache {operation} failed: {message}")]
    Backend {
        /// What operation was being performed.
        operation: &'static str,
        /// Error message.
        message: String,
    },

    /// A value could not be encoded for the cache.
    #[error("cache serialization failed for {key}: {message}")]
    Serialization {
        /// The cache key.
        key: String,
        /// Error message.
        message: String,
    },
}

impl CacheError {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Backend { .. } | Self::Serialization { .. } => ErrorKind::Exception,
        }
    }
}
