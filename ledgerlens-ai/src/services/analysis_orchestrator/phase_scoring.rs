//! Phases 6-7: VALIDATING_BALANCE → SCORING_CONFIDENCE
//!
//! Balance and template compliance are reported, never corrected: an
//! unbalanced or non-compliant entry is returned as proposed and flagged
//! for review.

use std::collections::HashSet;

use super::phase_matching::MatchingOutcome;
use super::{failure, AnalysisOrchestrator, PhaseResult, RunContext};
use crate::models::{
    AccountingEntrySection, AnalysisMode, AnalysisState, BalanceCheck, ConfidenceSummary,
    DocumentAnalysis, EntryTemplate, ReferenceDataSnapshot, ResponseMetadata, StructuredAnalysis,
    SuccessResponse, TemplateInfo, ValidationSection,
};
use crate::services::balance_validator;
use crate::services::confidence_scorer::missing_required_fields;

/// Output of the balance phase
pub(super) struct ValidationOutcome {
    pub balance: BalanceCheck,
    /// Deviations from the matched template's account list
    pub compliance_violations: Vec<String>,
    /// Lines whose account code is not in the chart of accounts
    pub unknown_accounts: Vec<usize>,
    /// Lines with no account code, a negative amount, or no amount at all
    pub malformed_lines: Vec<usize>,
}

impl AnalysisOrchestrator {
    /// Phase 6: VALIDATING_BALANCE
    pub(super) async fn phase_validating_balance(
        &self,
        ctx: &RunContext,
        snapshot: &ReferenceDataSnapshot,
        matching: &MatchingOutcome,
        analysis: &StructuredAnalysis,
    ) -> ValidationOutcome {
        self.transition(ctx, AnalysisState::ValidatingBalance).await;

        let entries = &analysis.accounting_entry.entries;
        let balance = balance_validator::check(entries);

        let compliance_violations = match (matching.decision.mode, &matching.decision.template) {
            (AnalysisMode::TemplateOnly, Some(template)) => template_violations(template, analysis),
            _ => Vec::new(),
        };

        let unknown_accounts: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, line)| {
                !line.account_code.trim().is_empty() && snapshot.account(&line.account_code).is_none()
            })
            .map(|(i, _)| i)
            .collect();

        let malformed_lines: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, line)| line.is_malformed())
            .map(|(i, _)| i)
            .collect();

        if !balance.balanced {
            tracing::warn!(
                request_id = %ctx.request_id,
                total_debit = balance.total_debit,
                total_credit = balance.total_credit,
                difference = balance.difference(),
                "Proposed entry does not balance"
            );
        }
        if !compliance_violations.is_empty() {
            tracing::warn!(
                request_id = %ctx.request_id,
                violations = compliance_violations.len(),
                "Proposed entry deviates from template"
            );
        }

        tracing::info!(
            request_id = %ctx.request_id,
            lines = entries.len(),
            balanced = balance.balanced,
            "Phase 6: VALIDATING_BALANCE complete"
        );

        ValidationOutcome {
            balance,
            compliance_violations,
            unknown_accounts,
            malformed_lines,
        }
    }

    /// Phase 7: SCORING_CONFIDENCE, then assembly of the success response
    pub(super) async fn phase_scoring_confidence(
        &self,
        ctx: &RunContext,
        snapshot: &ReferenceDataSnapshot,
        matching: MatchingOutcome,
        analysis: StructuredAnalysis,
        validation: ValidationOutcome,
    ) -> PhaseResult<SuccessResponse> {
        let stage = AnalysisState::ScoringConfidence;
        self.transition(ctx, stage).await;

        let MatchingOutcome { pages, decision } = matching;

        // Purchase documents are matched against creditors, sales against debtors
        let role = analysis.counterparty.role;
        let party_match = self.party_matcher.match_party(
            analysis.counterparty.name.as_deref(),
            analysis.counterparty.tax_id.as_deref(),
            snapshot.parties(role),
        );

        let confidence = self
            .scorer
            .score(
                decision.mode,
                &decision.result,
                &party_match,
                &analysis,
                &validation.balance,
            )
            .map_err(|e| failure(stage, "internal", e.to_string()))?;

        let mut fields_requiring_review: Vec<String> = missing_required_fields(&analysis)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !party_match.is_found() {
            fields_requiring_review.push("counterparty".to_string());
        }
        if !validation.balance.balanced {
            fields_requiring_review.push("accounting_entry.balance_check".to_string());
        }
        fields_requiring_review.extend(
            validation
                .unknown_accounts
                .iter()
                .map(|i| format!("accounting_entry.entries[{}].account_code", i)),
        );
        fields_requiring_review.extend(
            validation
                .malformed_lines
                .iter()
                .map(|i| format!("accounting_entry.entries[{}]", i)),
        );
        if !validation.compliance_violations.is_empty() {
            fields_requiring_review.push("template_info.compliance_violations".to_string());
        }
        if analysis.partial {
            fields_requiring_review.push("document_analysis.partial".to_string());
        }

        let requires_review = confidence.requires_review
            || analysis.partial
            || !validation.compliance_violations.is_empty()
            || !validation.unknown_accounts.is_empty()
            || !validation.malformed_lines.is_empty();

        tracing::info!(
            request_id = %ctx.request_id,
            score = confidence.overall,
            level = confidence.level.as_str(),
            party = party_match.method.as_str(),
            requires_review,
            "Phase 7: SCORING_CONFIDENCE complete"
        );

        let images_processed = ctx.session.lock().await.images_processed;
        let template_used = decision.mode == AnalysisMode::TemplateOnly;
        let entry = analysis.accounting_entry;

        Ok(SuccessResponse {
            document_analysis: DocumentAnalysis {
                document_type: analysis.document_type,
                relationship: pages.relationship,
                page_count: pages.pages.len(),
                category: Some(decision.category.phrase).filter(|p| !p.is_empty()),
                partial: analysis.partial,
            },
            receipt: analysis.receipt,
            accounting_entry: AccountingEntrySection {
                journal_code: entry.journal_code,
                entry_date: entry.entry_date,
                description: entry.description,
                entries: entry.entries,
                balance_check: validation.balance,
            },
            template_info: TemplateInfo {
                template_used,
                template_id: decision.template.map(|t| t.id),
                confidence: decision.result.confidence,
                selection_reason: decision.result.rationale,
                compliance_violations: validation.compliance_violations,
            },
            counterparty_match: party_match,
            validation: ValidationSection {
                confidence: ConfidenceSummary {
                    level: confidence.level,
                    score: confidence.overall,
                    factors: confidence.factors,
                },
                requires_review,
                fields_requiring_review,
            },
            metadata: ResponseMetadata {
                request_id: ctx.request_id,
                duration_ms: ctx.elapsed_ms(),
                images_processed,
                mode: decision.mode,
            },
        })
    }
}

/// Exact account-set comparison against a template
pub(crate) fn template_violations(
    template: &EntryTemplate,
    analysis: &StructuredAnalysis,
) -> Vec<String> {
    let expected: HashSet<&str> = template
        .accounts
        .iter()
        .map(|a| a.account_code.as_str())
        .collect();
    let actual: HashSet<&str> = analysis
        .accounting_entry
        .entries
        .iter()
        .map(|e| e.account_code.as_str())
        .collect();

    let mut violations = Vec::new();
    for account in &template.accounts {
        if !actual.contains(account.account_code.as_str()) {
            violations.push(format!(
                "Template account {} ({}) is missing from the entry",
                account.account_code, account.account_label
            ));
        }
    }

    let mut reported = HashSet::new();
    for line in &analysis.accounting_entry.entries {
        let code = line.account_code.as_str();
        if !expected.contains(code) && reported.insert(code) {
            violations.push(format!(
                "Account {} is not part of template '{}'",
                code, template.id
            ));
        }
    }

    violations
}
