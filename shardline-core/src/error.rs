//! Error taxonomy shared by all Shardline crates.
//!
//! Every crate defines its own error enum with the context it needs, and
//! every one of those enums maps onto an [`ErrorKind`]. Callers branch on the
//! kind; operators read the message.

use std::fmt;

/// The result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failure, independent of the component that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing input. Never retried.
    Validation,
    /// An absent registry, assignment or item row. Never retried; callers
    /// often translate it into a default value.
    NotFound,
    /// The target table briefly reports not-found. Retried by the engine.
    Transient,
    /// Throughput exceeded or work left unprocessed. Retried with
    /// reconciliation by the engine; surfaced only once the budget is spent.
    Throughput,
    /// A conditional write lost a race or violated a business precondition.
    /// Surfaced to the caller, never retried by the engine.
    ConditionalCheckFailed,
    /// Unexpected transport or internal fault.
    Exception,
}

impl ErrorKind {
    /// Returns true if the retry engine may retry an operation failing with
    /// this kind.
    #[must_use]
    pub const fn is_engine_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Throughput)
    }

    /// Returns the stable lowercase name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Transient => "transient",
            Self::Throughput => "throughput",
            Self::ConditionalCheckFailed => "conditional_check_failed",
            Self::Exception => "exception",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by core type constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },

    /// An unknown enumeration value was provided.
    UnknownVariant {
        /// The enumeration being parsed.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl Error {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::UnknownVariant { kind, value } => {
                write!(f, "unknown {kind}: '{value}'")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidArgument {
            name: "shard_name",
            reason: "must not be empty",
        };
        assert_eq!(
            format!("{err}"),
            "invalid argument 'shard_name': must not be empty"
        );
    }

    #[test]
    fn test_engine_retryable_kinds() {
        assert!(ErrorKind::Transient.is_engine_retryable());
        assert!(ErrorKind::Throughput.is_engine_retryable());
        assert!(!ErrorKind::ConditionalCheckFailed.is_engine_retryable());
        assert!(!ErrorKind::Validation.is_engine_retryable());
        assert!(!ErrorKind::NotFound.is_engine_retryable());
        assert!(!ErrorKind::Exception.is_engine_retryable());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(
            ErrorKind::ConditionalCheckFailed.to_string(),
            "conditional_check_failed"
        );
    }
}
