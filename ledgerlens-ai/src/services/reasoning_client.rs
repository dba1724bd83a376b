//! Reasoning service client
//!
//! The reasoning service is an opaque collaborator: images in, extracted text
//! out; composed analysis request in, structured (usually JSON) text out.
//! Failures are reported as [`CallError`]s so the call governor can decide
//! whether to retry.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ledgerlens_common::config::ReasoningConfig;
use serde::Serialize;
use std::time::Duration;

use crate::models::{AnalysisRequest, DocumentImage, OcrExtraction};
use crate::services::call_governor::{CallError, ErrorCategory};

const USER_AGENT: &str = concat!("LedgerLens/", env!("CARGO_PKG_VERSION"));
/// Longest error body kept in a CallError message
const MAX_ERROR_BODY: usize = 512;

/// External text/vision reasoning service
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// OCR one image, returning text plus quality signals
    async fn extract_text(&self, image: &DocumentImage) -> Result<OcrExtraction, CallError>;

    /// Structure the consolidated document text; returns the raw response
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, CallError>;
}

#[derive(Serialize)]
struct ExtractTextPayload<'a> {
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<&'a str>,
    image_base64: String,
}

/// JSON-over-HTTP reasoning service client
pub struct HttpReasoningClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpReasoningClient {
    pub fn new(config: &ReasoningConfig, api_key: Option<String>) -> Result<Self, CallError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| CallError::new(ErrorCategory::Unknown, e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, CallError> {
        let mut request = self.http_client.post(self.url(path)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }

        Err(CallError::new(
            ErrorCategory::from_status(status.as_u16()),
            format!("Reasoning service returned {}: {}", status, body),
        ))
    }
}

/// Decode a successful extraction body
///
/// A 200 with an unreadable body is usually a truncated upstream response,
/// so it is classified as a retryable server error.
fn decode_extraction(body: &str) -> Result<OcrExtraction, CallError> {
    serde_json::from_str(body).map_err(|e| {
        CallError::new(
            ErrorCategory::ServerError,
            format!("Malformed extraction response: {}", e),
        )
    })
}

#[async_trait]
impl ReasoningService for HttpReasoningClient {
    async fn extract_text(&self, image: &DocumentImage) -> Result<OcrExtraction, CallError> {
        let payload = ExtractTextPayload {
            mime_type: &image.mime_type,
            file_name: image.file_name.as_deref(),
            image_base64: STANDARD.encode(&image.bytes),
        };

        tracing::debug!(
            bytes = image.bytes.len(),
            mime_type = %image.mime_type,
            "Requesting text extraction"
        );

        let response = self.post("v1/extract-text", &payload).await?;
        decode_extraction(&response.text().await?)
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, CallError> {
        tracing::debug!(
            request_id = %request.request_id,
            mode = request.mode.as_str(),
            accounts = request.reference.accounts.len(),
            "Requesting structured analysis"
        );

        let response = self.post("v1/analyze", request).await?;
        Ok(response.text().await?)
    }
}
