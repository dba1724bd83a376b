//! Phase 1: VALIDATING_REFERENCE_DATA
//!
//! Snapshot load and minimum-collection check. Nothing external is called
//! for a tenant that cannot post an entry.

use std::sync::Arc;

use super::{error_failure, AnalysisOrchestrator, Halt, PhaseResult, RunContext};
use crate::models::{AnalysisState, ReferenceDataSnapshot, RejectionReason, RejectionResponse};

impl AnalysisOrchestrator {
    /// Phase 1: VALIDATING_REFERENCE_DATA
    pub(super) async fn phase_validating_reference(
        &self,
        ctx: &RunContext,
    ) -> PhaseResult<Arc<ReferenceDataSnapshot>> {
        let stage = AnalysisState::ValidatingReferenceData;

        let snapshot = match self.cache.get(&ctx.tenant_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => match self.stale_fallback(&ctx.tenant_id).await {
                Some(snapshot) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        tenant_id = %ctx.tenant_id,
                        error = %e,
                        loaded_at = %snapshot.loaded_at,
                        "Backing store unavailable, using stale reference data"
                    );
                    snapshot
                }
                None => return Err(error_failure(stage, e)),
            },
        };

        let missing = snapshot.missing_collections();
        if !missing.is_empty() {
            return Err(Halt::Rejected(RejectionResponse {
                reason: RejectionReason::MasterDataNotFound,
                message: format!(
                    "Tenant '{}' has no {} configured; an accounting entry cannot be proposed",
                    ctx.tenant_id,
                    missing.join(" or ")
                ),
                failed_images: Vec::new(),
                suggestions: missing
                    .iter()
                    .map(|collection| match *collection {
                        "accounts" => "Import or create the chart of accounts for this tenant",
                        _ => "Create at least one journal for this tenant",
                    })
                    .map(str::to_string)
                    .collect(),
            }));
        }

        tracing::info!(
            request_id = %ctx.request_id,
            tenant_id = %ctx.tenant_id,
            accounts = snapshot.accounts.len(),
            journals = snapshot.journals.len(),
            templates = snapshot.templates.len(),
            "Phase 1: VALIDATING_REFERENCE_DATA complete"
        );

        Ok(snapshot)
    }

    async fn stale_fallback(&self, tenant_id: &str) -> Option<Arc<ReferenceDataSnapshot>> {
        if !self.config.allow_stale_reference_data {
            return None;
        }
        self.cache.stale(tenant_id).await
    }
}
