//! Invariant checkers for Shardline simulation tests.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use shardline_ledger::BalanceRecord;

/// A violated balance invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceViolation {
    /// `pessimistic != settled - unsettled`.
    PessimisticDrift {
        /// Owner address.
        owner: String,
        /// Stored pessimistic balance.
        stored: BigInt,
        /// `settled - unsettled`.
        expected: BigInt,
    },
    /// An accepted debit left the pessimistic balance negative.
    NegativePessimistic {
        /// Owner address.
        owner: String,
        /// Stored pessimistic balance.
        stored: BigInt,
    },
}

/// Checks the ledger invariants of one committed record.
///
/// # Errors
///
/// Returns the first violated invariant.
pub fn check_balance_record(
    record: &BalanceRecord,
    allow_negative: bool,
) -> Result<(), BalanceViolation> {
    let expected = &record.settled_balance - &record.unsettled_debits;
    if record.pessimistic_settled_balance != expected {
        return Err(BalanceViolation::PessimisticDrift {
            owner: record.owner_address.clone(),
            stored: record.pessimistic_settled_balance.clone(),
            expected,
        });
    }
    if !allow_negative && record.pessimistic_settled_balance.is_negative() {
        return Err(BalanceViolation::NegativePessimistic {
            owner: record.owner_address.clone(),
            stored: record.pessimistic_settled_balance.clone(),
        });
    }
    Ok(())
}

/// Client-side model of one balance, used as the oracle in workloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceModel {
    /// Settled balance.
    pub settled: BigInt,
    /// Outstanding debits.
    pub unsettled: BigInt,
}

impl BalanceModel {
    /// Settled net of outstanding debits.
    #[must_use]
    pub fn pessimistic(&self) -> BigInt {
        &self.settled - &self.unsettled
    }

    /// `settled - max(unsettled, 0)`.
    #[must_use]
    pub fn available(&self) -> BigInt {
        if self.unsettled.is_positive() {
            self.pessimistic()
        } else {
            self.settled.clone()
        }
    }

    /// Returns true if the store should accept these deltas.
    #[must_use]
    pub fn accepts(&self, delta_unsettled: &BigInt) -> bool {
        !delta_unsettled.is_positive() || self.pessimistic() >= *delta_unsettled
    }

    /// Applies accepted deltas.
    pub fn apply(&mut self, delta_settled: &BigInt, delta_unsettled: &BigInt) {
        self.settled += delta_settled;
        self.unsettled += delta_unsettled;
    }

    /// Returns true if both fields are zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.settled.is_zero() && self.unsettled.is_zero()
    }
}
