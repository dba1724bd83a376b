//! Fuzzy matching results shared by the template and party matchers

use serde::{Deserialize, Serialize};

/// How a match was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    TaxId,
    NotFound,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Fuzzy => "fuzzy",
            MatchMethod::TaxId => "tax_id",
            MatchMethod::NotFound => "not_found",
        }
    }
}

/// Reference-data label scored against an input string
///
/// Lives only for the duration of one matching call.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub label: String,
    pub normalized: String,
    /// Code of the record the label belongs to
    pub code: String,
}

/// Outcome of a matching call
///
/// Constructors keep the score consistent with the method: `not_found`
/// always scores 0, `exact` and `tax_id` always score 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched_label: Option<String>,
    pub matched_code: Option<String>,
    /// 0-100
    pub confidence: f64,
    pub method: MatchMethod,
    pub rationale: String,
}

impl MatchResult {
    pub fn exact(label: &str, code: &str, rationale: impl Into<String>) -> Self {
        Self {
            matched_label: Some(label.to_string()),
            matched_code: Some(code.to_string()),
            confidence: 100.0,
            method: MatchMethod::Exact,
            rationale: rationale.into(),
        }
    }

    pub fn tax_id(label: &str, code: &str, rationale: impl Into<String>) -> Self {
        Self {
            matched_label: Some(label.to_string()),
            matched_code: Some(code.to_string()),
            confidence: 100.0,
            method: MatchMethod::TaxId,
            rationale: rationale.into(),
        }
    }

    pub fn fuzzy(label: &str, code: &str, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            matched_label: Some(label.to_string()),
            matched_code: Some(code.to_string()),
            confidence: round2(confidence.clamp(0.0, 100.0)),
            method: MatchMethod::Fuzzy,
            rationale: rationale.into(),
        }
    }

    pub fn not_found(rationale: impl Into<String>) -> Self {
        Self {
            matched_label: None,
            matched_code: None,
            confidence: 0.0,
            method: MatchMethod::NotFound,
            rationale: rationale.into(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.method != MatchMethod::NotFound
    }
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
