//! Analysis workflow state machine
//!
//! A request progresses through
//! VALIDATING_REFERENCE_DATA → EXTRACTING_TEXT → MATCHING_TEMPLATE →
//! SELECTING_MODE → ANALYZING_STRUCTURE → VALIDATING_BALANCE →
//! SCORING_CONFIDENCE and ends in exactly one of DONE, REJECTED, FAILED or
//! TIMED_OUT.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::analysis::AnalysisMode;

/// Analysis workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    /// Snapshot load and minimum-collection check
    ValidatingReferenceData,
    /// Quality gate plus per-image OCR
    ExtractingText,
    /// Relationship detection and template scoring
    MatchingTemplate,
    /// Template-only vs free-analysis decision
    SelectingMode,
    /// Structuring call to the reasoning service
    AnalyzingStructure,
    /// Debit/credit totals and template compliance
    ValidatingBalance,
    /// Party match and weighted confidence
    ScoringConfidence,
    Done,
    Rejected,
    Failed,
    TimedOut,
}

impl AnalysisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisState::ValidatingReferenceData => "VALIDATING_REFERENCE_DATA",
            AnalysisState::ExtractingText => "EXTRACTING_TEXT",
            AnalysisState::MatchingTemplate => "MATCHING_TEMPLATE",
            AnalysisState::SelectingMode => "SELECTING_MODE",
            AnalysisState::AnalyzingStructure => "ANALYZING_STRUCTURE",
            AnalysisState::ValidatingBalance => "VALIDATING_BALANCE",
            AnalysisState::ScoringConfidence => "SCORING_CONFIDENCE",
            AnalysisState::Done => "DONE",
            AnalysisState::Rejected => "REJECTED",
            AnalysisState::Failed => "FAILED",
            AnalysisState::TimedOut => "TIMED_OUT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisState::Done
                | AnalysisState::Rejected
                | AnalysisState::Failed
                | AnalysisState::TimedOut
        )
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub request_id: Uuid,
    pub old_state: AnalysisState,
    pub new_state: AnalysisState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory progress of one analysis request
///
/// Shared between the workflow task and the deadline watcher so a timeout
/// response can report how far the run got.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSession {
    pub request_id: Uuid,
    pub tenant_id: String,

    /// Current workflow state
    pub state: AnalysisState,

    /// Non-terminal states already left behind, in order
    pub completed_states: Vec<AnalysisState>,

    /// Images whose OCR result has arrived
    pub images_processed: usize,
    pub images_total: usize,

    /// Set once SELECTING_MODE completes
    pub mode: Option<AnalysisMode>,

    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AnalysisSession {
    pub fn new(request_id: Uuid, tenant_id: &str, images_total: usize) -> Self {
        Self {
            request_id,
            tenant_id: tenant_id.to_string(),
            state: AnalysisState::ValidatingReferenceData,
            completed_states: Vec::new(),
            images_processed: 0,
            images_total,
            mode: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    ///
    /// The state being left is recorded as completed unless the new state is
    /// terminal (a state interrupted by failure or timeout did not complete).
    pub fn transition_to(&mut self, new_state: AnalysisState) -> StateTransition {
        let transition = StateTransition {
            request_id: self.request_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };

        let completed = match new_state {
            AnalysisState::Done => true,
            s => !s.is_terminal(),
        };
        if completed && !self.state.is_terminal() {
            self.completed_states.push(self.state);
        }

        self.state = new_state;
        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    pub fn record_image_processed(&mut self) {
        self.images_processed = (self.images_processed + 1).min(self.images_total);
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed_ms(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_record_completed_states() {
        let mut session = AnalysisSession::new(Uuid::new_v4(), "t1", 2);
        session.transition_to(AnalysisState::ExtractingText);
        session.transition_to(AnalysisState::MatchingTemplate);

        assert_eq!(
            session.completed_states,
            vec![
                AnalysisState::ValidatingReferenceData,
                AnalysisState::ExtractingText
            ]
        );
        assert!(!session.is_terminal());
    }

    #[test]
    fn test_failure_does_not_complete_current_state() {
        let mut session = AnalysisSession::new(Uuid::new_v4(), "t1", 1);
        session.transition_to(AnalysisState::ExtractingText);
        let transition = session.transition_to(AnalysisState::Failed);

        assert_eq!(transition.old_state, AnalysisState::ExtractingText);
        assert_eq!(
            session.completed_states,
            vec![AnalysisState::ValidatingReferenceData]
        );
        assert!(session.is_terminal());
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_image_counter_saturates_at_total() {
        let mut session = AnalysisSession::new(Uuid::new_v4(), "t1", 1);
        session.record_image_processed();
        session.record_image_processed();
        assert_eq!(session.images_processed, 1);
    }

    #[test]
    fn test_state_serializes_screaming_snake() {
        let json = serde_json::to_value(AnalysisState::ValidatingReferenceData).unwrap();
        assert_eq!(json, "VALIDATING_REFERENCE_DATA");
        assert_eq!(AnalysisState::TimedOut.to_string(), "TIMED_OUT");
    }
}
