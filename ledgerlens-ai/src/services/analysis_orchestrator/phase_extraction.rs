//! Phase 2: EXTRACTING_TEXT
//!
//! Pre-OCR quality gate, then one OCR call per image through the call
//! governor with bounded concurrency. Results are collected out of order and
//! re-sequenced by index before the quality floor is applied. A batch with
//! any failing image is rejected as a whole.

use futures::stream::{self, StreamExt};

use super::{error_failure, AnalysisOrchestrator, Halt, PhaseResult, RunContext};
use crate::models::{
    AnalysisState, DocumentImage, FailedImage, OcrExtraction, RejectionReason, RejectionResponse,
};
use crate::services::call_governor::CallError;

/// Issue keyword → remediation suggestion
const REMEDIATIONS: &[(&[&str], &str)] = &[
    (
        &["blur", "focus", "shake"],
        "Hold the camera steady and retake the photo in focus",
    ),
    (
        &["glare", "reflection", "flash"],
        "Avoid flash and direct light reflecting off the document",
    ),
    (
        &["dark", "shadow", "lighting", "exposure"],
        "Photograph the document in even, bright lighting",
    ),
    (
        &["crop", "cut", "partial", "edge", "corner"],
        "Make sure all four corners of the document are inside the frame",
    ),
    (
        &["resolution", "small", "pixel"],
        "Move closer so the text fills most of the frame",
    ),
    (
        &["empty", "size", "exceeds"],
        "Re-upload the original photo file",
    ),
];

impl AnalysisOrchestrator {
    /// Phase 2: EXTRACTING_TEXT
    ///
    /// # Returns
    /// One extraction per image, in submission order
    pub(super) async fn phase_extracting_text(
        &self,
        ctx: &RunContext,
        images: &[DocumentImage],
    ) -> PhaseResult<Vec<OcrExtraction>> {
        let stage = AnalysisState::ExtractingText;
        self.transition(ctx, stage).await;

        tracing::info!(
            request_id = %ctx.request_id,
            images = images.len(),
            workers = self.config.ocr_workers,
            "Phase 2: EXTRACTING_TEXT"
        );

        if images.is_empty() {
            return Err(Halt::Rejected(RejectionResponse {
                reason: RejectionReason::ExtractionQualityInsufficient,
                message: "No document images were submitted".to_string(),
                failed_images: Vec::new(),
                suggestions: vec!["Attach at least one photo of the document".to_string()],
            }));
        }

        let unusable = self.pre_ocr_gate(images);
        if !unusable.is_empty() {
            return Err(Halt::Rejected(quality_rejection(unusable)));
        }

        let mut results: Vec<(usize, Result<OcrExtraction, CallError>)> =
            stream::iter(0..images.len())
                .map(|index| async move {
                    let image = &images[index];
                    let result = self
                        .governor
                        .execute("extract_text", &self.retry_policy, &ctx.cancel, || {
                            self.reasoning.extract_text(image)
                        })
                        .await;
                    if result.is_ok() {
                        ctx.session.lock().await.record_image_processed();
                    }
                    (index, result)
                })
                .buffer_unordered(self.config.ocr_workers.max(1))
                .collect()
                .await;

        // Workers finish in any order
        results.sort_by_key(|(index, _)| *index);

        let mut extractions = Vec::with_capacity(results.len());
        for (index, result) in results {
            match result {
                Ok(extraction) => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        index,
                        confidence = extraction.confidence,
                        chars = extraction.text.chars().count(),
                        "Image text extracted"
                    );
                    extractions.push(extraction);
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %ctx.request_id,
                        index,
                        category = e.category.as_str(),
                        error = %e.message,
                        "Text extraction failed"
                    );
                    return Err(error_failure(stage, e));
                }
            }
        }

        let floor = self.config.min_extraction_confidence;
        let failing: Vec<FailedImage> = extractions
            .iter()
            .enumerate()
            .filter(|(_, e)| e.confidence < floor)
            .map(|(index, e)| FailedImage {
                index,
                confidence: e.confidence,
                issues: if e.issues.is_empty() {
                    vec![format!(
                        "Extraction confidence {:.0} below {:.0}",
                        e.confidence, floor
                    )]
                } else {
                    e.issues.clone()
                },
            })
            .collect();

        if !failing.is_empty() {
            return Err(Halt::Rejected(quality_rejection(failing)));
        }

        Ok(extractions)
    }

    /// Payloads that cannot be worth an OCR call
    fn pre_ocr_gate(&self, images: &[DocumentImage]) -> Vec<FailedImage> {
        let max_bytes = self.config.max_image_bytes;
        images
            .iter()
            .enumerate()
            .filter_map(|(index, image)| {
                let issue = if image.bytes.is_empty() {
                    "Image payload is empty".to_string()
                } else if image.bytes.len() > max_bytes {
                    format!(
                        "Image size {} bytes exceeds the {} byte limit",
                        image.bytes.len(),
                        max_bytes
                    )
                } else {
                    return None;
                };
                Some(FailedImage {
                    index,
                    confidence: 0.0,
                    issues: vec![issue],
                })
            })
            .collect()
    }
}

fn quality_rejection(failed_images: Vec<FailedImage>) -> RejectionResponse {
    let indexes: Vec<String> = failed_images.iter().map(|f| f.index.to_string()).collect();
    RejectionResponse {
        reason: RejectionReason::ExtractionQualityInsufficient,
        message: format!(
            "Text could not be extracted reliably from image(s) {}; the whole batch was rejected",
            indexes.join(", ")
        ),
        suggestions: suggestions_for(&failed_images),
        failed_images,
    }
}

/// Remediation suggestions for the reported issues, deduplicated
pub(crate) fn suggestions_for(failed_images: &[FailedImage]) -> Vec<String> {
    let issues: Vec<String> = failed_images
        .iter()
        .flat_map(|f| f.issues.iter().map(|i| i.to_lowercase()))
        .collect();

    let mut suggestions: Vec<String> = REMEDIATIONS
        .iter()
        .filter(|(keywords, _)| {
            issues
                .iter()
                .any(|issue| keywords.iter().any(|k| issue.contains(k)))
        })
        .map(|(_, suggestion)| suggestion.to_string())
        .collect();

    if suggestions.is_empty() {
        suggestions.push("Retake the photo with the whole document flat and in focus".to_string());
    }
    suggestions
}
