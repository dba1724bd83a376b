//! Phase 5: ANALYZING_STRUCTURE
//!
//! Builds the reference subset for the selected mode, calls the reasoning
//! service through the call governor and parses its output.

use super::phase_matching::MatchingOutcome;
use super::{error_failure, AnalysisOrchestrator, PhaseResult, RunContext};
use crate::models::{
    AnalysisMode, AnalysisRequest, AnalysisState, EntryTemplate, ReferenceDataSnapshot,
    ReferenceSubset, StructuredAnalysis,
};
use crate::services::response_parser;

impl AnalysisOrchestrator {
    /// Phase 5: ANALYZING_STRUCTURE
    pub(super) async fn phase_analyzing_structure(
        &self,
        ctx: &RunContext,
        snapshot: &ReferenceDataSnapshot,
        matching: &MatchingOutcome,
    ) -> PhaseResult<StructuredAnalysis> {
        let stage = AnalysisState::AnalyzingStructure;
        self.transition(ctx, stage).await;

        let decision = &matching.decision;
        let reference = reference_subset(snapshot, decision.mode, decision.template.as_ref());
        let category = Some(decision.category.phrase.clone()).filter(|p| !p.is_empty());

        let request = AnalysisRequest {
            request_id: ctx.request_id,
            tenant_id: ctx.tenant_id.clone(),
            mode: decision.mode,
            document_text: matching.pages.consolidated_text.clone(),
            page_count: matching.pages.pages.len(),
            relationship: matching.pages.relationship,
            category,
            template: decision.template.clone(),
            reference,
        };

        tracing::info!(
            request_id = %ctx.request_id,
            mode = request.mode.as_str(),
            accounts = request.reference.accounts.len(),
            journals = request.reference.journals.len(),
            "Phase 5: ANALYZING_STRUCTURE"
        );

        let raw = self
            .governor
            .execute("analyze", &self.retry_policy, &ctx.cancel, || {
                self.reasoning.analyze(&request)
            })
            .await
            .map_err(|e| error_failure(stage, e))?;

        let analysis = response_parser::parse(&raw)
            .map_err(|e| error_failure(stage, e))?;

        if analysis.partial {
            tracing::warn!(
                request_id = %ctx.request_id,
                "Structured result recovered through fallback parsing; marked partial"
            );
        }

        Ok(analysis)
    }
}

/// Reference data disclosed to the reasoning service
///
/// Free analysis gets the whole snapshot. Template-only mode gets the
/// matched template, its journal and accounts, and the party lookup lists.
pub(crate) fn reference_subset(
    snapshot: &ReferenceDataSnapshot,
    mode: AnalysisMode,
    template: Option<&EntryTemplate>,
) -> ReferenceSubset {
    let template = match (mode, template) {
        (AnalysisMode::TemplateOnly, Some(template)) => template,
        _ => {
            return ReferenceSubset {
                accounts: snapshot.accounts.clone(),
                journals: snapshot.journals.clone(),
                creditors: snapshot.creditors.clone(),
                debtors: snapshot.debtors.clone(),
                templates: snapshot.templates.clone(),
                profile: snapshot.profile.clone(),
            };
        }
    };

    let codes = template.account_codes();
    let accounts = snapshot
        .accounts
        .iter()
        .filter(|a| codes.contains(&a.code.as_str()))
        .cloned()
        .collect();

    let journals = match template
        .journal_code
        .as_deref()
        .and_then(|code| snapshot.journal(code))
    {
        Some(journal) => vec![journal.clone()],
        None => snapshot.journals.clone(),
    };

    ReferenceSubset {
        accounts,
        journals,
        creditors: snapshot.creditors.clone(),
        debtors: snapshot.debtors.clone(),
        templates: vec![template.clone()],
        profile: None,
    }
}
