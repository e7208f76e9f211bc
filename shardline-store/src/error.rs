//! Store error types.
//!
//! This module defines the errors a keyed-item backend can raise and how
//! they map onto the shared error taxonomy.

use shardline_core::ErrorKind;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during keyed-item operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The table reported not-found, e.g. while racing its creation.
    #[error("resource not found: table {table}")]
    ResourceNotFound {
        /// The table that was not found.
        table: String,
    },

    /// A conditional write was rejected by the backend.
    #[error("conditional check failed on table {table}")]
    ConditionalCheckFailed {
        /// The table the write targeted.
        table: String,
    },

    /// The backend throttled the request.
    #[error("throughput exceeded on table {table}")]
    ThroughputExceeded {
        /// The throttled table.
        table: String,
    },

    /// The request was malformed.
    #[error("invalid request: {message}")]
    Validation {
        /// What was wrong with the request.
        message: String,
    },

    /// The transport or backend failed unexpectedly.
    #[error("transport error: {operation}: {message}")]
    Transport {
        /// What operation was being performed.
        operation: &'static str,
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceNotFound { .. } => ErrorKind::Transient,
            Self::ConditionalCheckFailed { .. } => ErrorKind::ConditionalCheckFailed,
            Self::ThroughputExceeded { .. } => ErrorKind::Throughput,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transport { .. } => ErrorKind::Exception,
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns true if this is a conditional check failure.
    #[must_use]
    pub const fn is_conditional_check_failed(&self) -> bool {
        matches!(self, Self::ConditionalCheckFailed { .. })
    }
}
