//! Response shapes produced by the analysis pipeline
//!
//! Exactly one [`AnalysisResponse`] is produced per request. Each terminal
//! state has its own shape, discriminated by the `status` field.

use serde::Serialize;
use uuid::Uuid;

use super::analysis::{AnalysisMode, DocumentRelationship, ReceiptFields};
use super::analysis_session::AnalysisState;
use super::confidence::{ConfidenceFactors, ConfidenceLevel};
use super::entry::{AccountingEntryLine, BalanceCheck};
use super::matching::MatchResult;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisResponse {
    Success(Box<SuccessResponse>),
    Rejected(RejectionResponse),
    Error(ErrorResponse),
    Timeout(TimeoutResponse),
}

impl AnalysisResponse {
    pub fn status(&self) -> &'static str {
        match self {
            AnalysisResponse::Success(_) => "success",
            AnalysisResponse::Rejected(_) => "rejected",
            AnalysisResponse::Error(_) => "error",
            AnalysisResponse::Timeout(_) => "timeout",
        }
    }

    pub fn as_success(&self) -> Option<&SuccessResponse> {
        match self {
            AnalysisResponse::Success(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rejection(&self) -> Option<&RejectionResponse> {
        match self {
            AnalysisResponse::Rejected(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorResponse> {
        match self {
            AnalysisResponse::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_timeout(&self) -> Option<&TimeoutResponse> {
        match self {
            AnalysisResponse::Timeout(t) => Some(t),
            _ => None,
        }
    }
}

// ============================================================================
// Success
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub document_analysis: DocumentAnalysis,
    pub receipt: ReceiptFields,
    pub accounting_entry: AccountingEntrySection,
    pub template_info: TemplateInfo,
    pub counterparty_match: MatchResult,
    pub validation: ValidationSection,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalysis {
    pub document_type: Option<String>,
    pub relationship: DocumentRelationship,
    pub page_count: usize,
    /// Main category phrase the template matcher worked from
    pub category: Option<String>,
    /// Recovered through the degraded parse path
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountingEntrySection {
    pub journal_code: Option<String>,
    pub entry_date: Option<String>,
    pub description: Option<String>,
    pub entries: Vec<AccountingEntryLine>,
    pub balance_check: BalanceCheck,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub template_used: bool,
    pub template_id: Option<String>,
    pub confidence: f64,
    pub selection_reason: String,
    /// Deviations from the template's account list (template-only mode)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compliance_violations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSection {
    pub confidence: ConfidenceSummary,
    pub requires_review: bool,
    pub fields_requiring_review: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceSummary {
    pub level: ConfidenceLevel,
    pub score: f64,
    pub factors: ConfidenceFactors,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub request_id: Uuid,
    pub duration_ms: u64,
    pub images_processed: usize,
    pub mode: AnalysisMode,
}

// ============================================================================
// Rejection / error / timeout
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    MasterDataNotFound,
    ExtractionQualityInsufficient,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectionResponse {
    pub reason: RejectionReason,
    pub message: String,
    pub failed_images: Vec<FailedImage>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedImage {
    /// Position in the submitted batch
    pub index: usize,
    pub confidence: f64,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error category (`rate_limited`, `parse_failure`, `backing_store`, ...)
    pub category: String,
    /// State the run was in when it failed
    pub stage: AnalysisState,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeoutResponse {
    pub message: String,
    pub last_state: AnalysisState,
    pub completed_states: Vec<AnalysisState>,
    pub images_processed: usize,
    pub images_total: usize,
    pub elapsed_ms: u64,
}
