//! Double-entry accounting lines and their derived balance state

use serde::{Deserialize, Serialize};

use super::analysis::lenient_amount;

/// One line of an accounting entry
///
/// Both amounts must be non-negative. Conventionally only one of
/// debit/credit is non-zero, but that is not enforced; only the totals have
/// to balance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountingEntryLine {
    #[serde(default)]
    pub account_code: String,
    #[serde(default)]
    pub account_label: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub debit: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub credit: f64,
}

impl AccountingEntryLine {
    pub fn debit(code: &str, label: &str, amount: f64) -> Self {
        Self {
            account_code: code.to_string(),
            account_label: label.to_string(),
            debit: amount,
            credit: 0.0,
        }
    }

    pub fn credit(code: &str, label: &str, amount: f64) -> Self {
        Self {
            account_code: code.to_string(),
            account_label: label.to_string(),
            debit: 0.0,
            credit: amount,
        }
    }

    /// Missing account code, a negative amount, or neither side carries an
    /// amount
    pub fn is_malformed(&self) -> bool {
        self.account_code.trim().is_empty()
            || self.debit < 0.0
            || self.credit < 0.0
            || (self.debit == 0.0 && self.credit == 0.0)
    }
}

/// Result of summing an entry's debits and credits
///
/// Always derived from the lines it describes; never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub balanced: bool,
    pub total_debit: f64,
    pub total_credit: f64,
}

impl BalanceCheck {
    pub fn difference(&self) -> f64 {
        self.total_debit - self.total_credit
    }
}
