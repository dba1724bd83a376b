//! Phases 3-4: MATCHING_TEMPLATE → SELECTING_MODE
//!
//! Relationship detection over the ordered pages, then one template match
//! over the consolidated text. The template decision fixes the mode.

use super::{AnalysisOrchestrator, RunContext};
use crate::models::{AnalysisState, OcrExtraction, Party, ReferenceDataSnapshot};
use crate::services::document_relationship::{analyze_pages, PageAnalysis};
use crate::services::template_matcher::TemplateDecision;

/// Output of the matching phases
pub(super) struct MatchingOutcome {
    pub pages: PageAnalysis,
    pub decision: TemplateDecision,
}

impl AnalysisOrchestrator {
    /// Phases 3-4: MATCHING_TEMPLATE and SELECTING_MODE
    pub(super) async fn phase_matching_template(
        &self,
        ctx: &RunContext,
        snapshot: &ReferenceDataSnapshot,
        extractions: &[OcrExtraction],
    ) -> MatchingOutcome {
        self.transition(ctx, AnalysisState::MatchingTemplate).await;

        let page_texts: Vec<String> = extractions.iter().map(|e| e.text.clone()).collect();
        let pages = analyze_pages(&page_texts);

        // Template counterparties may be given as party codes of either role
        let parties: Vec<Party> = snapshot
            .creditors
            .iter()
            .chain(snapshot.debtors.iter())
            .cloned()
            .collect();
        let decision = self.template_matcher.match_document(
            &pages.consolidated_text,
            &snapshot.templates,
            &parties,
        );

        tracing::info!(
            request_id = %ctx.request_id,
            relationship = pages.relationship.as_str(),
            category = %decision.category.phrase,
            template_confidence = decision.result.confidence,
            "Phase 3: MATCHING_TEMPLATE complete"
        );

        self.transition(ctx, AnalysisState::SelectingMode).await;
        ctx.session.lock().await.mode = Some(decision.mode);

        tracing::info!(
            request_id = %ctx.request_id,
            mode = decision.mode.as_str(),
            template = ?decision.template.as_ref().map(|t| t.id.as_str()),
            "Phase 4: SELECTING_MODE complete"
        );

        MatchingOutcome { pages, decision }
    }
}
