//! Strongly-typed names for shards and entity types.
//!
//! A shard name doubles as the physical table name on the backend, so it
//! follows the backend's table naming rules. Entity types are free-form
//! labels (`userBalances`) grouping shards that hold the same kind of record.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::limits::{ENTITY_TYPE_LEN_MAX, SHARD_NAME_LEN_MAX, SHARD_NAME_LEN_MIN};

/// Macro to generate strongly-typed string name wrappers.
///
/// Each name type wraps a `String` and provides:
/// - Type safety (can't mix `ShardName` with `EntityType`)
/// - Display formatting of the raw value
/// - Transparent serde representation
macro_rules! define_name {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Returns the name as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the name and returns the inner string.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }
    };
}

define_name!(ShardName, "Globally unique shard name, also the backend table name.");
define_name!(EntityType, "Label for the kind of entity a group of shards stores.");

impl ShardName {
    /// Creates a shard name after validating it against table naming rules.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the name is too short, too long, or
    /// contains characters other than `[A-Za-z0-9_.-]`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.len() < SHARD_NAME_LEN_MIN {
            return Err(Error::InvalidArgument {
                name: "shard_name",
                reason: "must be at least 3 characters",
            });
        }
        if name.len() > SHARD_NAME_LEN_MAX {
            return Err(Error::InvalidArgument {
                name: "shard_name",
                reason: "must be at most 255 characters",
            });
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(Error::InvalidArgument {
                name: "shard_name",
                reason: "may only contain [A-Za-z0-9_.-]",
            });
        }
        Ok(Self(name))
    }
}

impl EntityType {
    /// Creates an entity type label.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the label is blank or too long.
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(Error::InvalidArgument {
                name: "entity_type",
                reason: "must not be empty",
            });
        }
        if label.len() > ENTITY_TYPE_LEN_MAX {
            return Err(Error::InvalidArgument {
                name: "entity_type",
                reason: "must be at most 255 characters",
            });
        }
        Ok(Self(label))
    }
}

// -----------------------------------------------------------------------------
// AllocationState
// -----------------------------------------------------------------------------

/// Whether a shard accepts automatic assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationState {
    /// Open for new automatic assignments.
    Enabled,
    /// Dedicated or closed; only forced assignments may target it.
    Disabled,
}

impl AllocationState {
    /// All allocation states, in a stable order.
    pub const ALL: [Self; 2] = [Self::Enabled, Self::Disabled];

    /// Returns the stored representation of this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AllocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            _ => Err(Error::UnknownVariant {
                kind: "allocation state",
                value: s.to_string(),
            }),
        }
    }
}

/// Filter used when listing shards of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationFilter {
    /// Every shard regardless of state.
    All,
    /// Only shards in the given state.
    Only(AllocationState),
}

impl AllocationFilter {
    /// Returns true if a shard in `state` passes this filter.
    #[must_use]
    pub fn matches(self, state: AllocationState) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == state,
        }
    }

    /// Returns the stored representation of this filter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Only(state) => state.as_str(),
        }
    }
}

impl From<AllocationState> for AllocationFilter {
    fn from(state: AllocationState) -> Self {
        Self::Only(state)
    }
}

impl FromStr for AllocationFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Only)
        }
    }
}

/// Current Unix timestamp in seconds.
#[must_use]
pub fn current_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_name_validation() {
        assert!(ShardName::new("bal_shard_1").is_ok());
        assert!(ShardName::new("a.b-c_d").is_ok());
        assert!(ShardName::new("ab").is_err());
        assert!(ShardName::new("bad name").is_err());
        assert!(ShardName::new("x".repeat(256)).is_err());
    }

    #[test]
    fn test_entity_type_validation() {
        assert!(EntityType::new("userBalances").is_ok());
        assert!(EntityType::new("   ").is_err());
        assert!(EntityType::new("").is_err());
    }

    #[test]
    fn test_allocation_state_round_trip_names() {
        assert_eq!("enabled".parse::<AllocationState>().unwrap(), AllocationState::Enabled);
        assert_eq!("DISABLED".parse::<AllocationState>().unwrap(), AllocationState::Disabled);
        assert!("open".parse::<AllocationState>().is_err());
    }

    #[test]
    fn test_allocation_filter() {
        assert_eq!("all".parse::<AllocationFilter>().unwrap(), AllocationFilter::All);
        let only = AllocationFilter::from(AllocationState::Enabled);
        assert!(only.matches(AllocationState::Enabled));
        assert!(!only.matches(AllocationState::Disabled));
        assert!(AllocationFilter::All.matches(AllocationState::Disabled));
        assert_eq!(only.as_str(), "enabled");
    }

    #[test]
    fn test_name_display() {
        let name = ShardName::new("bal_shard_1").unwrap();
        assert_eq!(format!("{name}"), "bal_shard_1");
        assert_eq!(name.as_str(), "bal_shard_1");
    }
}
