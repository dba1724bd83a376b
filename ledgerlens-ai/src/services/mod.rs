//! Service modules for the document analysis pipeline
//!
//! Leaves first: normalization and pure matchers/validators, then the
//! resilience layer (reference cache, call governor, reasoning client), then
//! the orchestrator that sequences them.

pub mod analysis_orchestrator;
pub mod balance_validator;
pub mod call_governor;
pub mod confidence_scorer;
pub mod document_relationship;
pub mod party_matcher;
pub mod reasoning_client;
pub mod reference_cache;
pub mod response_parser;
pub mod template_matcher;
pub mod text_normalizer;

pub use analysis_orchestrator::AnalysisOrchestrator;
pub use call_governor::{CallError, CallGovernor, ErrorCategory, RetryPolicy};
pub use confidence_scorer::{ConfidenceError, ConfidenceScorer};
pub use document_relationship::{analyze_pages, PageAnalysis, PageKind, PageSummary};
pub use party_matcher::PartyMatcher;
pub use reasoning_client::{HttpReasoningClient, ReasoningService};
pub use reference_cache::{CacheError, ReferenceDataCache};
pub use response_parser::ParseError;
pub use template_matcher::{TemplateDecision, TemplateMatcher};
