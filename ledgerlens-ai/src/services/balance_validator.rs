//! Balance Validator
//!
//! Sums debits and credits independently and compares them within one
//! currency minor unit. Amounts are never adjusted; an unbalanced entry is a
//! reportable outcome.

use crate::models::{AccountingEntryLine, BalanceCheck};

/// Maximum |debit - credit| still considered balanced
pub const BALANCE_TOLERANCE: f64 = 0.01;

const FLOAT_SLACK: f64 = 1e-12;

/// Compute the balance state of a set of entry lines
pub fn check(entries: &[AccountingEntryLine]) -> BalanceCheck {
    let total_debit: f64 = entries.iter().map(|e| e.debit).sum();
    let total_credit: f64 = entries.iter().map(|e| e.credit).sum();

    // Compared on the raw sums; the slack only absorbs float representation
    // error at the tolerance edge
    let difference = (total_debit - total_credit).abs();
    let slack = FLOAT_SLACK * total_debit.abs().max(total_credit.abs()).max(1.0);

    BalanceCheck {
        balanced: difference <= BALANCE_TOLERANCE + slack,
        total_debit: round_minor(total_debit),
        total_credit: round_minor(total_credit),
    }
}

fn round_minor(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
