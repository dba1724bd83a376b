//! Error types for ledgerlens-ai
//!
//! Component errors stay in their modules; [`PipelineError`] is the union
//! used where several of them meet (the binary, store bootstrap, and the
//! orchestrator's error responses).
//! No-match and not-balanced outcomes are values, never errors.

use thiserror::Error;

use crate::services::call_governor::CallError;
use crate::services::reference_cache::CacheError;
use crate::services::response_parser::ParseError;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// ledgerlens-common error (database, configuration, I/O)
    #[error("Common error: {0}")]
    Common(#[from] ledgerlens_common::Error),

    /// Reference data could not be loaded
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// External call failed permanently or exhausted its retries
    #[error("External call failed: {0}")]
    Call(#[from] CallError),

    /// Structured output could not be recovered
    #[error("Parse failure: {0}")]
    Parse(#[from] ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Category string used in error responses
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Common(_) | PipelineError::Cache(_) => "backing_store",
            PipelineError::Call(e) => e.category.as_str(),
            PipelineError::Parse(_) => "parse_failure",
            PipelineError::Io(_) => "internal",
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
