//! Data models for ledgerlens-ai
//!
//! - Tenant reference data and its immutable snapshot
//! - Per-request analysis inputs and the structured result
//! - Analysis workflow state machine
//! - Response shapes

pub mod analysis;
pub mod analysis_session;
pub mod confidence;
pub mod entry;
pub mod matching;
pub mod reference;
pub mod response;

pub use analysis::{
    parse_amount, AnalysisMode, AnalysisRequest, CategorySource, CounterpartyFields,
    DocumentCategory, DocumentImage, DocumentRelationship, EntryFields, OcrExtraction,
    ReceiptFields, ReferenceSubset, StructuredAnalysis,
};
pub use analysis_session::{AnalysisSession, AnalysisState, StateTransition};
pub use confidence::{ConfidenceFactors, ConfidenceLevel, ConfidenceResult};
pub use entry::{AccountingEntryLine, BalanceCheck};
pub use matching::{round2, MatchCandidate, MatchMethod, MatchResult};
pub use reference::{
    Account, EntryTemplate, Journal, Party, PartyRole, ReferenceDataSnapshot, TemplateAccount,
};
pub use response::{
    AccountingEntrySection, AnalysisResponse, ConfidenceSummary, DocumentAnalysis, ErrorResponse,
    FailedImage, RejectionReason, RejectionResponse, ResponseMetadata, SuccessResponse,
    TemplateInfo, TimeoutResponse, ValidationSection,
};
