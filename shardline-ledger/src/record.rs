//! Balance records and their read and write shapes.

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use shardline_store::{Item, ItemExt, StoreResult};

use crate::schema::{attr, BalanceKey};

/// A committed balance record.
///
/// For every committed record
/// `pessimistic_settled_balance == settled_balance - unsettled_debits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// Owner address, lower-cased.
    pub owner_address: String,
    /// Asset address, lower-cased.
    pub asset_address: String,
    /// Settled balance.
    pub settled_balance: BigInt,
    /// Outstanding debits.
    pub unsettled_debits: BigInt,
    /// Settled balance net of outstanding debits.
    pub pessimistic_settled_balance: BigInt,
    /// Last write time, Unix seconds; zero for a record never written.
    pub updated_at_secs: u64,
}

impl BalanceRecord {
    /// The all-zero record reported for a key that was never written.
    #[must_use]
    pub fn zero(key: &BalanceKey) -> Self {
        Self {
            owner_address: key.owner_address.clone(),
            asset_address: key.asset_address.clone(),
            settled_balance: BigInt::zero(),
            unsettled_debits: BigInt::zero(),
            pessimistic_settled_balance: BigInt::zero(),
            updated_at_secs: 0,
        }
    }

    /// Decodes a stored record. Missing numeric attributes read as zero.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a key attribute is missing.
    pub fn from_item(row: &Item) -> StoreResult<Self> {
        Ok(Self {
            owner_address: row.require_string(attr::OWNER_ADDRESS)?.to_string(),
            asset_address: row.require_string(attr::ASSET_ADDRESS)?.to_string(),
            settled_balance: row.bigint_attr(attr::SETTLED_BALANCE).unwrap_or_default(),
            unsettled_debits: row.bigint_attr(attr::UNSETTLED_DEBITS).unwrap_or_default(),
            pessimistic_settled_balance: row
                .bigint_attr(attr::PESSIMISTIC_SETTLED_BALANCE)
                .unwrap_or_default(),
            updated_at_secs: row.u64_attr(attr::UPDATED_AT).unwrap_or(0),
        })
    }

    /// `settled - max(unsettled, 0)`, computed on every read.
    #[must_use]
    pub fn available_balance(&self) -> BigInt {
        if self.unsettled_debits > BigInt::zero() {
            &self.settled_balance - &self.unsettled_debits
        } else {
            self.settled_balance.clone()
        }
    }

    /// Returns true if the stored pessimistic balance matches its definition.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.pessimistic_settled_balance == &self.settled_balance - &self.unsettled_debits
    }
}

/// Caller-facing balance, with every amount rendered as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    /// Settled balance.
    pub settled_balance: String,
    /// Outstanding debits.
    pub unsettled_debits: String,
    /// Settled balance less positive outstanding debits.
    pub available_balance: String,
}

impl From<&BalanceRecord> for BalanceView {
    fn from(record: &BalanceRecord) -> Self {
        Self {
            settled_balance: record.settled_balance.to_string(),
            unsettled_debits: record.unsettled_debits.to_string(),
            available_balance: record.available_balance().to_string(),
        }
    }
}

/// Fields to overwrite in a balance record. At least one must be set.
///
/// Only the given fields are written. The pessimistic balance is derived
/// when settled and unsettled are both given without it; any other partial
/// overwrite can leave `pessimistic != settled - unsettled`, and a later
/// debit is then guarded by the stale pessimistic value. Set all three (or
/// settled and unsettled together) to keep the record consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceOverwrite {
    /// New settled balance.
    pub settled_balance: Option<BigInt>,
    /// New outstanding debits.
    pub unsettled_debits: Option<BigInt>,
    /// New pessimistic balance.
    pub pessimistic_settled_balance: Option<BigInt>,
}

impl BalanceOverwrite {
    /// Creates an empty overwrite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the settled balance.
    #[must_use]
    pub fn with_settled(mut self, value: BigInt) -> Self {
        self.settled_balance = Some(value);
        self
    }

    /// Sets the outstanding debits.
    #[must_use]
    pub fn with_unsettled(mut self, value: BigInt) -> Self {
        self.unsettled_debits = Some(value);
        self
    }

    /// Sets the pessimistic balance.
    #[must_use]
    pub fn with_pessimistic(mut self, value: BigInt) -> Self {
        self.pessimistic_settled_balance = Some(value);
        self
    }

    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.settled_balance.is_none()
            && self.unsettled_debits.is_none()
            && self.pessimistic_settled_balance.is_none()
    }

    /// Fills in the pessimistic balance when both of its inputs are given.
    #[must_use]
    pub fn with_derived_pessimistic(mut self) -> Self {
        if self.pessimistic_settled_balance.is_none() {
            if let (Some(settled), Some(unsettled)) = (&self.settled_balance, &self.unsettled_debits)
            {
                self.pessimistic_settled_balance = Some(settled - unsettled);
            }
        }
        self
    }
}
