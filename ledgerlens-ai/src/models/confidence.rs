//! Confidence factors and the scored result

use serde::{Deserialize, Serialize};

/// Five independent quality signals, each 0-100
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub template_match: f64,
    pub party_match: f64,
    pub data_completeness: f64,
    pub field_validation: f64,
    pub balance_validation: f64,
}

/// Banded overall confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// very_low <50, low <70, medium <85, high <95, very_high ≥95
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            ConfidenceLevel::VeryHigh
        } else if score >= 85.0 {
            ConfidenceLevel::High
        } else if score >= 70.0 {
            ConfidenceLevel::Medium
        } else if score >= 50.0 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryLow => "very_low",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::VeryHigh => "very_high",
        }
    }
}

/// Weighted confidence with review decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub factors: ConfidenceFactors,
    /// Weighted sum, 2 decimals
    pub overall: f64,
    pub level: ConfidenceLevel,
    pub requires_review: bool,
    /// Why review is required; empty when it is not
    pub review_reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_band_edges() {
        assert_eq!(ConfidenceLevel::from_score(49.99), ConfidenceLevel::VeryLow);
        assert_eq!(ConfidenceLevel::from_score(50.0), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(70.0), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(85.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(95.0), ConfidenceLevel::VeryHigh);
    }
}
