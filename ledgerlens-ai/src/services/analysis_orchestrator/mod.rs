//! Analysis orchestrator
//!
//! Sequences one analysis request through its states
//!
//! # State Progression
//! VALIDATING_REFERENCE_DATA → EXTRACTING_TEXT → MATCHING_TEMPLATE →
//! SELECTING_MODE → ANALYZING_STRUCTURE → VALIDATING_BALANCE →
//! SCORING_CONFIDENCE → DONE
//!
//! Any state may end the run in REJECTED or FAILED; the deadline may end it
//! in TIMED_OUT. Each state is handled by a `phase_*` method:
//!
//! - **phase_reference**: snapshot load and minimum-collection check
//! - **phase_extraction**: pre-OCR quality gate, bounded parallel OCR, quality floor
//! - **phase_matching**: page relationship, template matching, mode selection
//! - **phase_analysis**: reference subset, structuring call, response parsing
//! - **phase_scoring**: balance, template compliance, party match, confidence
//!
//! # Deadline
//! The workflow runs in a spawned task and reports through a `oneshot`
//! channel. [`AnalysisOrchestrator::analyze`] selects between that channel
//! and the deadline; when the deadline wins the cancellation token fires,
//! the receiver is dropped and a timeout response with partial progress is
//! returned. Exactly one response is produced per request.

use chrono::Utc;
use ledgerlens_common::config::PipelineConfig;
use ledgerlens_common::events::{EventBus, PipelineEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{
    AnalysisResponse, AnalysisSession, AnalysisState, DocumentImage, ErrorResponse,
    RejectionResponse, TimeoutResponse,
};
use crate::services::call_governor::{CallGovernor, ErrorCategory, RetryPolicy};
use crate::services::confidence_scorer::ConfidenceScorer;
use crate::services::party_matcher::PartyMatcher;
use crate::services::reasoning_client::ReasoningService;
use crate::services::reference_cache::ReferenceDataCache;
use crate::services::template_matcher::TemplateMatcher;

// Phase modules (internal implementation)
mod phase_reference;
mod phase_extraction;
mod phase_matching;
mod phase_analysis;
mod phase_scoring;

/// Why a run stopped short of DONE
#[derive(Debug)]
enum Halt {
    Rejected(RejectionResponse),
    Failed(ErrorResponse),
    /// Deadline fired; whatever is returned now is discarded
    Canceled,
}

type PhaseResult<T> = Result<T, Halt>;

fn failure(stage: AnalysisState, category: &str, message: impl Into<String>) -> Halt {
    Halt::Failed(ErrorResponse {
        category: category.to_string(),
        stage,
        message: message.into(),
    })
}

/// Failed halt for a component error; a canceled call halts silently
fn error_failure(stage: AnalysisState, err: impl Into<PipelineError>) -> Halt {
    let err = err.into();
    if let PipelineError::Call(call) = &err {
        if call.category == ErrorCategory::Canceled {
            return Halt::Canceled;
        }
    }
    failure(stage, err.category(), err.to_string())
}

/// Per-request state shared between the workflow task and the deadline
struct RunContext {
    request_id: Uuid,
    tenant_id: String,
    session: Arc<Mutex<AnalysisSession>>,
    cancel: CancellationToken,
    started: Instant,
}

impl RunContext {
    fn checkpoint(&self) -> PhaseResult<()> {
        if self.cancel.is_cancelled() {
            Err(Halt::Canceled)
        } else {
            Ok(())
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Analysis orchestrator
///
/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    cache: Arc<ReferenceDataCache>,
    governor: Arc<CallGovernor>,
    reasoning: Arc<dyn ReasoningService>,
    retry_policy: RetryPolicy,
    template_matcher: TemplateMatcher,
    party_matcher: PartyMatcher,
    scorer: ConfidenceScorer,
    config: Arc<PipelineConfig>,
    event_bus: Option<EventBus>,
}

impl AnalysisOrchestrator {
    /// Create a new orchestrator
    ///
    /// # Arguments
    /// * `cache` - Reference data cache (shared across requests)
    /// * `governor` - Process-wide call governor
    /// * `reasoning` - Reasoning service used for OCR and structuring
    /// * `retry_policy` - Retry policy applied to every reasoning call
    /// * `config` - Pipeline thresholds and limits
    pub fn new(
        cache: Arc<ReferenceDataCache>,
        governor: Arc<CallGovernor>,
        reasoning: Arc<dyn ReasoningService>,
        retry_policy: RetryPolicy,
        config: PipelineConfig,
    ) -> Self {
        Self {
            cache,
            governor,
            reasoning,
            retry_policy,
            template_matcher: TemplateMatcher::new(config.template_threshold),
            party_matcher: PartyMatcher::new(config.party_threshold),
            scorer: ConfidenceScorer::new(config.reference_driven_baseline),
            config: Arc::new(config),
            event_bus: None,
        }
    }

    /// Emit state and completion events on the given bus
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.config.deadline_secs)
    }

    /// Analyze one submission of document images for a tenant
    ///
    /// Never fails: every outcome, including infrastructure failures and the
    /// deadline, is expressed as an [`AnalysisResponse`].
    pub async fn analyze(&self, tenant_id: &str, images: Vec<DocumentImage>) -> AnalysisResponse {
        let request_id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(AnalysisSession::new(
            request_id,
            tenant_id,
            images.len(),
        )));
        let cancel = CancellationToken::new();
        let ctx = RunContext {
            request_id,
            tenant_id: tenant_id.to_string(),
            session: Arc::clone(&session),
            cancel: cancel.clone(),
            started: Instant::now(),
        };

        tracing::info!(
            request_id = %request_id,
            tenant_id,
            images = images.len(),
            "Starting document analysis"
        );

        let (tx, rx) = oneshot::channel();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let response = orchestrator.run(&ctx, images).await;
            // The receiver is gone once the deadline has answered
            let _ = tx.send(response);
        });

        let deadline = self.deadline();
        let response = tokio::select! {
            biased;

            result = rx => match result {
                Ok(response) => response,
                Err(_) => {
                    let stage = session.lock().await.state;
                    tracing::error!(request_id = %request_id, %stage, "Analysis task ended without a response");
                    AnalysisResponse::Error(ErrorResponse {
                        category: "internal".to_string(),
                        stage,
                        message: "Analysis task ended without producing a response".to_string(),
                    })
                }
            },
            _ = tokio::time::sleep(deadline) => {
                cancel.cancel();
                self.timeout_response(request_id, tenant_id, &session, deadline).await
            }
        };

        let duration_ms = session.lock().await.elapsed_ms();
        tracing::info!(
            request_id = %request_id,
            tenant_id,
            status = response.status(),
            duration_ms,
            "Document analysis finished"
        );

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(PipelineEvent::AnalysisFinished {
                request_id,
                tenant_id: tenant_id.to_string(),
                status: response.status().to_string(),
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        response
    }

    /// Run every phase and settle the session's terminal state
    async fn run(&self, ctx: &RunContext, images: Vec<DocumentImage>) -> AnalysisResponse {
        match self.run_phases(ctx, &images).await {
            Ok(success) => {
                self.transition(ctx, AnalysisState::Done).await;
                AnalysisResponse::Success(Box::new(success))
            }
            Err(Halt::Rejected(rejection)) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    reason = ?rejection.reason,
                    failed_images = rejection.failed_images.len(),
                    "Analysis rejected"
                );
                self.transition(ctx, AnalysisState::Rejected).await;
                AnalysisResponse::Rejected(rejection)
            }
            Err(Halt::Failed(error)) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    category = %error.category,
                    stage = %error.stage,
                    error = %error.message,
                    "Analysis failed"
                );
                self.transition(ctx, AnalysisState::Failed).await;
                AnalysisResponse::Error(error)
            }
            Err(Halt::Canceled) => {
                tracing::debug!(request_id = %ctx.request_id, "Analysis canceled by deadline");
                let stage = ctx.session.lock().await.state;
                AnalysisResponse::Error(ErrorResponse {
                    category: ErrorCategory::Canceled.as_str().to_string(),
                    stage,
                    message: "Analysis canceled".to_string(),
                })
            }
        }
    }

    async fn run_phases(
        &self,
        ctx: &RunContext,
        images: &[DocumentImage],
    ) -> PhaseResult<crate::models::SuccessResponse> {
        let snapshot = self.phase_validating_reference(ctx).await?;
        ctx.checkpoint()?;

        let extractions = self.phase_extracting_text(ctx, images).await?;
        ctx.checkpoint()?;

        let matching = self.phase_matching_template(ctx, &snapshot, &extractions).await;
        ctx.checkpoint()?;

        let analysis = self
            .phase_analyzing_structure(ctx, &snapshot, &matching)
            .await?;
        ctx.checkpoint()?;

        let validation = self
            .phase_validating_balance(ctx, &snapshot, &matching, &analysis)
            .await;
        ctx.checkpoint()?;

        self.phase_scoring_confidence(ctx, &snapshot, matching, analysis, validation)
            .await
    }

    /// Move the session to a new state unless it has already ended
    ///
    /// # Returns
    /// false if the session was already terminal (e.g. timed out)
    async fn transition(&self, ctx: &RunContext, new_state: AnalysisState) -> bool {
        let transition = {
            let mut session = ctx.session.lock().await;
            if session.is_terminal() {
                return false;
            }
            session.transition_to(new_state)
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            old_state = %transition.old_state,
            new_state = %transition.new_state,
            "Analysis state changed"
        );

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(PipelineEvent::StateChanged {
                request_id: ctx.request_id,
                tenant_id: ctx.tenant_id.clone(),
                old_state: transition.old_state.to_string(),
                new_state: transition.new_state.to_string(),
                timestamp: transition.transitioned_at,
            });
        }

        true
    }

    async fn timeout_response(
        &self,
        request_id: Uuid,
        tenant_id: &str,
        session: &Mutex<AnalysisSession>,
        deadline: Duration,
    ) -> AnalysisResponse {
        let mut session = session.lock().await;
        let last_state = session.state;
        if !session.is_terminal() {
            let transition = session.transition_to(AnalysisState::TimedOut);
            if let Some(bus) = &self.event_bus {
                bus.emit_lossy(PipelineEvent::StateChanged {
                    request_id,
                    tenant_id: tenant_id.to_string(),
                    old_state: transition.old_state.to_string(),
                    new_state: transition.new_state.to_string(),
                    timestamp: transition.transitioned_at,
                });
            }
        }

        tracing::warn!(
            request_id = %request_id,
            tenant_id,
            %last_state,
            images_processed = session.images_processed,
            images_total = session.images_total,
            "Analysis deadline exceeded"
        );

        AnalysisResponse::Timeout(TimeoutResponse {
            message: format!(
                "Analysis did not finish within {}s; partial progress reported",
                deadline.as_secs()
            ),
            last_state,
            completed_states: session.completed_states.clone(),
            images_processed: session.images_processed,
            images_total: session.images_total,
            elapsed_ms: session.elapsed_ms(),
        })
    }
}
