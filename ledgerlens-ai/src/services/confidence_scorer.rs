//! Confidence Scorer
//!
//! Combines five independent quality signals into one weighted score, a level
//! band and a review decision.
//!
//! | Factor              | Weight |
//! |---------------------|--------|
//! | template match      | 0.30   |
//! | party match         | 0.25   |
//! | data completeness   | 0.20   |
//! | field validation    | 0.15   |
//! | balance validation  | 0.10   |
//!
//! Scoring is a pure function of its inputs: identical factors always yield
//! identical results.

use thiserror::Error;

use crate::models::{
    round2, AnalysisMode, BalanceCheck, ConfidenceFactors, ConfidenceLevel, ConfidenceResult,
    MatchResult, StructuredAnalysis,
};

pub const TEMPLATE_WEIGHT: f64 = 0.30;
pub const PARTY_WEIGHT: f64 = 0.25;
pub const COMPLETENESS_WEIGHT: f64 = 0.20;
pub const FIELD_VALIDATION_WEIGHT: f64 = 0.15;
pub const BALANCE_WEIGHT: f64 = 0.10;

/// Overall score below this requires review
pub const REVIEW_THRESHOLD: f64 = 85.0;
/// Completeness below this requires review
pub const COMPLETENESS_REVIEW_THRESHOLD: f64 = 80.0;
/// Balance factor below this requires review
pub const BALANCE_REVIEW_THRESHOLD: f64 = 90.0;

/// Balance factor for an unbalanced entry
pub const UNBALANCED_SCORE: f64 = 30.0;
/// Field-validation penalty per malformed line
pub const MALFORMED_LINE_PENALTY: f64 = 25.0;

/// Structural fields counted by data completeness
pub const REQUIRED_FIELDS: [&str; 4] = [
    "receipt.document_number",
    "receipt.document_date",
    "accounting_entry.journal_code",
    "receipt.total_amount",
];

/// Confidence scorer errors
#[derive(Debug, Error)]
pub enum ConfidenceError {
    /// Factor outside 0-100 (or NaN)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Confidence Scorer
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    /// Template factor used in free-analysis mode; 0 when unset
    reference_driven_baseline: Option<f64>,
}

impl ConfidenceScorer {
    pub fn new(reference_driven_baseline: Option<f64>) -> Self {
        Self {
            reference_driven_baseline,
        }
    }

    /// Score a structured analysis result
    ///
    /// # Arguments
    /// * `mode` - Mode the analysis ran in
    /// * `template_match` - Template matcher result
    /// * `party_match` - Party matcher result
    /// * `analysis` - Structured result (fields and entry lines)
    /// * `balance` - Balance of the entry lines
    pub fn score(
        &self,
        mode: AnalysisMode,
        template_match: &MatchResult,
        party_match: &MatchResult,
        analysis: &StructuredAnalysis,
        balance: &BalanceCheck,
    ) -> Result<ConfidenceResult, ConfidenceError> {
        let factors = ConfidenceFactors {
            template_match: self.template_factor(mode, template_match),
            party_match: party_match.confidence,
            data_completeness: data_completeness(analysis),
            field_validation: field_validation(analysis),
            balance_validation: balance_factor(balance),
        };

        score_factors(factors, party_match.is_found())
    }

    /// Template factor for the given mode
    ///
    /// Free-analysis mode uses the configured baseline, or 0.
    pub fn template_factor(&self, mode: AnalysisMode, template_match: &MatchResult) -> f64 {
        match mode {
            AnalysisMode::TemplateOnly => template_match.confidence,
            AnalysisMode::FreeAnalysis => self
                .reference_driven_baseline
                .map(|b| b.clamp(0.0, 100.0))
                .unwrap_or(0.0),
        }
    }
}

/// Weighted score, level and review decision for a set of factors
///
/// # Errors
/// Returns error if any factor is outside 0-100 or NaN.
pub fn score_factors(
    factors: ConfidenceFactors,
    party_found: bool,
) -> Result<ConfidenceResult, ConfidenceError> {
    let named = [
        ("template_match", factors.template_match),
        ("party_match", factors.party_match),
        ("data_completeness", factors.data_completeness),
        ("field_validation", factors.field_validation),
        ("balance_validation", factors.balance_validation),
    ];
    for (name, value) in named {
        if !(0.0..=100.0).contains(&value) {
            return Err(ConfidenceError::InvalidInput(format!(
                "{} out of range: {}",
                name, value
            )));
        }
    }

    let overall = round2(
        factors.template_match * TEMPLATE_WEIGHT
            + factors.party_match * PARTY_WEIGHT
            + factors.data_completeness * COMPLETENESS_WEIGHT
            + factors.field_validation * FIELD_VALIDATION_WEIGHT
            + factors.balance_validation * BALANCE_WEIGHT,
    );

    let mut review_reasons = Vec::new();
    if overall < REVIEW_THRESHOLD {
        review_reasons.push(format!(
            "Overall confidence {:.2} below {:.0}",
            overall, REVIEW_THRESHOLD
        ));
    }
    if !party_found {
        review_reasons.push("Counterparty not found in reference data".to_string());
    }
    if factors.data_completeness < COMPLETENESS_REVIEW_THRESHOLD {
        review_reasons.push(format!(
            "Data completeness {:.0}% below {:.0}%",
            factors.data_completeness, COMPLETENESS_REVIEW_THRESHOLD
        ));
    }
    if factors.balance_validation < BALANCE_REVIEW_THRESHOLD {
        review_reasons.push("Debits and credits do not balance".to_string());
    }

    Ok(ConfidenceResult {
        factors,
        overall,
        level: ConfidenceLevel::from_score(overall),
        requires_review: !review_reasons.is_empty(),
        review_reasons,
    })
}

/// Names of required structural fields missing from the analysis
pub fn missing_required_fields(analysis: &StructuredAnalysis) -> Vec<&'static str> {
    let present = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);

    let checks = [
        present(&analysis.receipt.document_number),
        present(&analysis.receipt.document_date) || present(&analysis.accounting_entry.entry_date),
        present(&analysis.accounting_entry.journal_code),
        analysis.receipt.total_amount.is_some(),
    ];

    REQUIRED_FIELDS
        .iter()
        .zip(checks)
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect()
}

/// Fraction of required structural fields present, × 100
pub fn data_completeness(analysis: &StructuredAnalysis) -> f64 {
    let missing = missing_required_fields(analysis).len();
    let present = REQUIRED_FIELDS.len() - missing;
    round2(present as f64 / REQUIRED_FIELDS.len() as f64 * 100.0)
}

/// 100 minus a penalty per malformed line, floored at 0; no lines scores 0
pub fn field_validation(analysis: &StructuredAnalysis) -> f64 {
    let entries = &analysis.accounting_entry.entries;
    if entries.is_empty() {
        return 0.0;
    }
    let malformed = entries.iter().filter(|e| e.is_malformed()).count();
    (100.0 - MALFORMED_LINE_PENALTY * malformed as f64).max(0.0)
}

pub fn balance_factor(balance: &BalanceCheck) -> f64 {
    if balance.balanced {
        100.0
    } else {
        UNBALANCED_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountingEntryLine, EntryFields, ReceiptFields};

    fn factors(t: f64, p: f64, d: f64, f: f64, b: f64) -> ConfidenceFactors {
        ConfidenceFactors {
            template_match: t,
            party_match: p,
            data_completeness: d,
            field_validation: f,
            balance_validation: b,
        }
    }

    fn complete_analysis() -> StructuredAnalysis {
        StructuredAnalysis {
            receipt: ReceiptFields {
                document_number: Some("INV-1".to_string()),
                document_date: Some("2024-03-01".to_string()),
                total_amount: Some(1070.0),
                ..Default::default()
            },
            accounting_entry: EntryFields {
                journal_code: Some("PJ".to_string()),
                entries: vec![
                    AccountingEntryLine::debit("5100", "Fuel", 1000.0),
                    AccountingEntryLine::debit("1155", "Input VAT", 70.0),
                    AccountingEntryLine::credit("2100", "Payable", 1070.0),
                ],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = TEMPLATE_WEIGHT
            + PARTY_WEIGHT
            + COMPLETENESS_WEIGHT
            + FIELD_VALIDATION_WEIGHT
            + BALANCE_WEIGHT;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_sum() {
        let result = score_factors(factors(92.0, 100.0, 100.0, 100.0, 100.0), true).unwrap();
        // 27.6 + 25 + 20 + 15 + 10
        assert_eq!(result.overall, 97.6);
        assert_eq!(result.level, ConfidenceLevel::VeryHigh);
        assert!(!result.requires_review);
        assert!(result.review_reasons.is_empty());
    }

    /// Identical inputs always yield identical outputs
    #[test]
    fn test_scoring_is_pure() {
        let f = factors(71.3, 64.2, 75.0, 50.0, 30.0);
        let a = score_factors(f, true).unwrap();
        let b = score_factors(f, true).unwrap();
        assert_eq!(a, b);
    }

    /// Raising any single factor never lowers the overall score
    #[test]
    fn test_monotonic_in_each_factor() {
        let base = [40.0, 50.0, 60.0, 70.0, 30.0];
        for index in 0..5 {
            let mut previous = f64::MIN;
            for step in 0..=10 {
                let mut values = base;
                values[index] = step as f64 * 10.0;
                let f = factors(values[0], values[1], values[2], values[3], values[4]);
                let overall = score_factors(f, true).unwrap().overall;
                assert!(overall >= previous, "factor {} not monotonic", index);
                previous = overall;
            }
        }
    }

    #[test]
    fn test_review_triggers() {
        let high = factors(100.0, 100.0, 100.0, 100.0, 100.0);
        assert!(score_factors(high, false).unwrap().requires_review);

        let incomplete = factors(100.0, 100.0, 75.0, 100.0, 100.0);
        let result = score_factors(incomplete, true).unwrap();
        assert!(result.overall >= 85.0);
        assert!(result.requires_review);

        let unbalanced = factors(100.0, 100.0, 100.0, 100.0, UNBALANCED_SCORE);
        let result = score_factors(unbalanced, true).unwrap();
        assert_eq!(result.overall, 93.0);
        assert!(result.requires_review);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(score_factors(factors(101.0, 0.0, 0.0, 0.0, 0.0), true).is_err());
        assert!(score_factors(factors(f64::NAN, 0.0, 0.0, 0.0, 0.0), true).is_err());
    }

    #[test]
    fn test_completeness_counts_required_fields() {
        let mut analysis = complete_analysis();
        assert_eq!(data_completeness(&analysis), 100.0);

        analysis.accounting_entry.journal_code = None;
        assert_eq!(data_completeness(&analysis), 75.0);
        assert_eq!(
            missing_required_fields(&analysis),
            vec!["accounting_entry.journal_code"]
        );
    }

    #[test]
    fn test_field_validation_penalty() {
        let mut analysis = complete_analysis();
        assert_eq!(field_validation(&analysis), 100.0);

        analysis.accounting_entry.entries[0].account_code = String::new();
        analysis.accounting_entry.entries[1].debit = 0.0;
        assert_eq!(field_validation(&analysis), 50.0);

        analysis.accounting_entry.entries.clear();
        assert_eq!(field_validation(&analysis), 0.0);
    }

    #[test]
    fn test_free_mode_template_factor() {
        let matched = MatchResult::fuzzy("Fuel", "T1", 92.0, "x");

        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.template_factor(AnalysisMode::TemplateOnly, &matched), 92.0);
        assert_eq!(scorer.template_factor(AnalysisMode::FreeAnalysis, &matched), 0.0);

        let scorer = ConfidenceScorer::new(Some(60.0));
        assert_eq!(scorer.template_factor(AnalysisMode::FreeAnalysis, &matched), 60.0);
    }

    #[test]
    fn test_score_end_to_end() {
        let analysis = complete_analysis();
        let balance = crate::services::balance_validator::check(&analysis.accounting_entry.entries);
        let result = ConfidenceScorer::default()
            .score(
                AnalysisMode::TemplateOnly,
                &MatchResult::fuzzy("Fuel", "T1", 92.0, "x"),
                &MatchResult::exact("PTT", "C001", "x"),
                &analysis,
                &balance,
            )
            .unwrap();

        assert_eq!(result.overall, 97.6);
        assert!(!result.requires_review);
    }
}
