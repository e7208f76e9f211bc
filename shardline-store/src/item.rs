//! Typed item representation.
//!
//! Every attribute carries its scalar type tag, mirroring the wire format of
//! the keyed-item backend. Numbers travel as decimal strings so that balances
//! keep arbitrary precision end to end.

use std::collections::BTreeMap;
use std::fmt;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// An item (or a key) is a map from attribute name to typed value.
pub type Item = BTreeMap<String, AttributeValue>;

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number, as a decimal string.
    N(String),
    /// Boolean.
    Bool(bool),
    /// Explicit null.
    Null,
}

impl AttributeValue {
    /// Creates a string value.
    pub fn s(value: impl Into<String>) -> Self {
        Self::S(value.into())
    }

    /// Creates a number value from anything that prints as a decimal.
    pub fn n(value: impl fmt::Display) -> Self {
        Self::N(value.to_string())
    }

    /// Returns the string payload, if this is a string.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the raw decimal payload, if this is a number.
    #[must_use]
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    /// Parses a number payload as an arbitrary-precision integer.
    #[must_use]
    pub fn as_bigint(&self) -> Option<BigInt> {
        self.as_n().and_then(|n| n.trim().parse().ok())
    }

    /// Returns the type tag used on the wire.
    #[must_use]
    pub const fn type_tag(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::Bool(_) => "BOOL",
            Self::Null => "NULL",
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::S(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::S(value)
    }
}

impl From<&BigInt> for AttributeValue {
    fn from(value: &BigInt) -> Self {
        Self::N(value.to_string())
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::N(value.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// -----------------------------------------------------------------------------
// ItemExt
// -----------------------------------------------------------------------------

/// Typed accessors over an [`Item`].
pub trait ItemExt {
    /// Returns a string attribute, or `None` if absent or not a string.
    fn string_attr(&self, name: &str) -> Option<&str>;

    /// Returns a number attribute parsed as a big integer.
    fn bigint_attr(&self, name: &str) -> Option<BigInt>;

    /// Returns a number attribute parsed as `u64`.
    fn u64_attr(&self, name: &str) -> Option<u64>;

    /// Returns a required string attribute.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the attribute is missing or mistyped.
    fn require_string(&self, name: &str) -> StoreResult<&str>;
}

impl ItemExt for Item {
    fn string_attr(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_s)
    }

    fn bigint_attr(&self, name: &str) -> Option<BigInt> {
        self.get(name).and_then(AttributeValue::as_bigint)
    }

    fn u64_attr(&self, name: &str) -> Option<u64> {
        self.get(name)
            .and_then(AttributeValue::as_n)
            .and_then(|n| n.trim().parse().ok())
    }

    fn require_string(&self, name: &str) -> StoreResult<&str> {
        self.string_attr(name)
            .ok_or_else(|| StoreError::validation(format!("missing string attribute '{name}'")))
    }
}

/// Builds an item from `(name, value)` pairs.
pub fn item<I, K, V>(pairs: I) -> Item
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<AttributeValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
