//! Typed write conditions and update actions.
//!
//! Backends that speak an expression language translate these into their
//! own syntax; the simulated backend evaluates them directly.

use std::cmp::Ordering;

use num_bigint::BigInt;

use crate::error::{StoreError, StoreResult};
use crate::item::{AttributeValue, Item};

/// Comparison operator of a [`Condition::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Returns the operator's expression syntax.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    const fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Ne => !matches!(ordering, Ordering::Equal),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Le => !matches!(ordering, Ordering::Greater),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Ge => !matches!(ordering, Ordering::Less),
        }
    }
}

/// Precondition attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The attribute is present on the stored item.
    AttributeExists(String),
    /// The attribute is absent (or the item does not exist).
    AttributeNotExists(String),
    /// The stored attribute compares to `value` with `op`.
    Compare {
        /// Attribute name.
        attribute: String,
        /// Operator.
        op: CompareOp,
        /// Right-hand side.
        value: AttributeValue,
    },
    /// All of the nested conditions hold.
    And(Vec<Condition>),
}

impl Condition {
    /// `attribute_exists(attribute)`.
    pub fn exists(attribute: impl Into<String>) -> Self {
        Self::AttributeExists(attribute.into())
    }

    /// `attribute_not_exists(attribute)`.
    pub fn not_exists(attribute: impl Into<String>) -> Self {
        Self::AttributeNotExists(attribute.into())
    }

    /// `attribute op value`.
    pub fn compare(attribute: impl Into<String>, op: CompareOp, value: AttributeValue) -> Self {
        Self::Compare {
            attribute: attribute.into(),
            op,
            value,
        }
    }

    /// Evaluates the condition against the currently stored item.
    ///
    /// Comparisons against a missing attribute or a value of another type
    /// are false, except `<>` which is true for a missing attribute.
    #[must_use]
    pub fn evaluate(&self, stored: Option<&Item>) -> bool {
        match self {
            Self::AttributeExists(attr) => stored.is_some_and(|item| item.contains_key(attr)),
            Self::AttributeNotExists(attr) => !stored.is_some_and(|item| item.contains_key(attr)),
            Self::Compare {
                attribute,
                op,
                value,
            } => match stored.and_then(|item| item.get(attribute)) {
                None => matches!(op, CompareOp::Ne),
                Some(current) => {
                    compare_values(current, value).is_some_and(|ordering| op.accepts(ordering))
                }
            },
            Self::And(all) => all.iter().all(|c| c.evaluate(stored)),
        }
    }
}

fn compare_values(left: &AttributeValue, right: &AttributeValue) -> Option<Ordering> {
    match (left, right) {
        (AttributeValue::N(_), AttributeValue::N(_)) => {
            let l = left.as_bigint()?;
            let r = right.as_bigint()?;
            Some(l.cmp(&r))
        }
        (AttributeValue::S(l), AttributeValue::S(r)) => Some(l.cmp(r)),
        (AttributeValue::Bool(l), AttributeValue::Bool(r)) => Some(l.cmp(r)),
        (AttributeValue::Null, AttributeValue::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// One clause of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAction {
    /// Overwrites the attribute.
    Set {
        /// Attribute name.
        attribute: String,
        /// New value.
        value: AttributeValue,
    },
    /// Adds a signed delta to a number attribute; a missing attribute
    /// counts as zero.
    Add {
        /// Attribute name.
        attribute: String,
        /// Delta to add.
        delta: BigInt,
    },
    /// Removes the attribute.
    Remove(String),
}

impl UpdateAction {
    /// `SET attribute = value`.
    pub fn set(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::Set {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// `ADD attribute delta`.
    pub fn add(attribute: impl Into<String>, delta: BigInt) -> Self {
        Self::Add {
            attribute: attribute.into(),
            delta,
        }
    }

    /// Returns the attribute this action touches.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Set { attribute, .. } | Self::Add { attribute, .. } => attribute,
            Self::Remove(attribute) => attribute,
        }
    }

    /// Applies the action to an item in place.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `Add` targets a non-number attribute.
    pub fn apply(&self, item: &mut Item) -> StoreResult<()> {
        match self {
            Self::Set { attribute, value } => {
                item.insert(attribute.clone(), value.clone());
            }
            Self::Add { attribute, delta } => {
                let current = match item.get(attribute) {
                    None => BigInt::default(),
                    Some(value) => value.as_bigint().ok_or_else(|| {
                        StoreError::validation(format!(
                            "ADD on non-number attribute '{attribute}'"
                        ))
                    })?,
                };
                item.insert(attribute.clone(), AttributeValue::from(&(current + delta)));
            }
            Self::Remove(attribute) => {
                item.remove(attribute);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::item;

    fn balance(pessimistic: i64) -> Item {
        item([
            ("owner_address", AttributeValue::s("0xabc")),
            ("pessimistic_settled_balance", AttributeValue::n(pessimistic)),
        ])
    }

    #[test]
    fn test_exists_conditions() {
        let stored = balance(10);
        assert!(Condition::exists("owner_address").evaluate(Some(&stored)));
        assert!(!Condition::exists("owner_address").evaluate(None));
        assert!(Condition::not_exists("owner_address").evaluate(None));
        assert!(!Condition::not_exists("owner_address").evaluate(Some(&stored)));
    }

    #[test]
    fn test_numeric_compare_is_not_lexicographic() {
        let stored = balance(100);
        let cond = Condition::compare(
            "pessimistic_settled_balance",
            CompareOp::Ge,
            AttributeValue::n(20),
        );
        assert!(cond.evaluate(Some(&stored)));

        let cond = Condition::compare(
            "pessimistic_settled_balance",
            CompareOp::Ge,
            AttributeValue::n(101),
        );
        assert!(!cond.evaluate(Some(&stored)));
    }

    #[test]
    fn test_compare_on_missing_attribute() {
        let cond = Condition::compare("missing", CompareOp::Ge, AttributeValue::n(0));
        assert!(!cond.evaluate(Some(&balance(1))));
        assert!(!cond.evaluate(None));
        let ne = Condition::compare("missing", CompareOp::Ne, AttributeValue::n(0));
        assert!(ne.evaluate(None));
    }

    #[test]
    fn test_add_action() {
        let mut stored = balance(5);
        UpdateAction::add("pessimistic_settled_balance", BigInt::from(-7))
            .apply(&mut stored)
            .unwrap();
        UpdateAction::add("settled_balance", BigInt::from(3))
            .apply(&mut stored)
            .unwrap();
        assert_eq!(
            stored["pessimistic_settled_balance"],
            AttributeValue::n(-2)
        );
        assert_eq!(stored["settled_balance"], AttributeValue::n(3));

        let err = UpdateAction::add("owner_address", BigInt::from(1)).apply(&mut stored);
        assert!(err.is_err());
    }
}
