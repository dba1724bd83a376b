//! In-memory stand-ins for the backing store and the reasoning service

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ledgerlens_ai::db::ReferenceStore;
use ledgerlens_ai::models::{
    Account, AnalysisRequest, DocumentImage, EntryTemplate, Journal, OcrExtraction, Party,
    PartyRole,
};
use ledgerlens_ai::services::{CallError, ErrorCategory, ReasoningService};
use ledgerlens_common::{Error, Result};

// ============================================================================
// Reference store
// ============================================================================

/// Reference data served for every tenant id
#[derive(Debug, Clone, Default)]
pub struct TenantData {
    pub accounts: Vec<Account>,
    pub journals: Vec<Journal>,
    pub creditors: Vec<Party>,
    pub debtors: Vec<Party>,
    pub templates: Vec<EntryTemplate>,
    pub profile: Option<String>,
}

/// Backing store that counts snapshot loads and can be switched to failing
pub struct MockStore {
    data: Mutex<TenantData>,
    /// One per snapshot load (counted on the accounts read)
    pub loads: AtomicUsize,
    pub fail: AtomicBool,
    load_delay: Option<Duration>,
}

impl MockStore {
    pub fn new(data: TenantData) -> Self {
        Self {
            data: Mutex::new(data),
            loads: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            load_delay: None,
        }
    }

    /// Every collection read sleeps for `delay` (tokio time)
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Replace the served data; visible on the next load
    pub fn replace(&self, data: TenantData) {
        *self.data.lock().unwrap() = data;
    }

    async fn read<T>(&self, pick: impl FnOnce(&TenantData) -> T) -> Result<T> {
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Internal("backing store offline".to_string()));
        }
        let data = self.data.lock().unwrap();
        Ok(pick(&data))
    }
}

#[async_trait]
impl ReferenceStore for MockStore {
    async fn load_accounts(&self, _tenant_id: &str) -> Result<Vec<Account>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.read(|d| d.accounts.clone()).await
    }

    async fn load_journals(&self, _tenant_id: &str) -> Result<Vec<Journal>> {
        self.read(|d| d.journals.clone()).await
    }

    async fn load_parties(&self, _tenant_id: &str, role: PartyRole) -> Result<Vec<Party>> {
        self.read(|d| match role {
            PartyRole::Creditor => d.creditors.clone(),
            PartyRole::Debtor => d.debtors.clone(),
        })
        .await
    }

    async fn load_templates(&self, _tenant_id: &str) -> Result<Vec<EntryTemplate>> {
        self.read(|d| d.templates.clone()).await
    }

    async fn load_profile(&self, _tenant_id: &str) -> Result<Option<String>> {
        self.read(|d| d.profile.clone()).await
    }
}

// ============================================================================
// Reasoning service
// ============================================================================

/// Reasoning service answering from fixed tables
///
/// OCR results are looked up by image bytes; every structuring call returns
/// the same raw text.
pub struct MockReasoning {
    pages: HashMap<Vec<u8>, OcrExtraction>,
    analysis: String,
    analyze_delay: Option<Duration>,
    pub extract_calls: AtomicUsize,
    pub analyze_calls: AtomicUsize,
    pub last_request: Mutex<Option<AnalysisRequest>>,
}

impl MockReasoning {
    pub fn new(analysis: impl Into<String>) -> Self {
        Self {
            pages: HashMap::new(),
            analysis: analysis.into(),
            analyze_delay: None,
            extract_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// OCR result for the image whose bytes are `key`
    pub fn with_page(mut self, key: &str, text: &str, confidence: f64, issues: &[&str]) -> Self {
        self.pages.insert(
            key.as_bytes().to_vec(),
            OcrExtraction {
                text: text.to_string(),
                confidence,
                issues: issues.iter().map(|i| i.to_string()).collect(),
            },
        );
        self
    }

    /// Structuring calls sleep for `delay` (tokio time) before answering
    pub fn with_analyze_delay(mut self, delay: Duration) -> Self {
        self.analyze_delay = Some(delay);
        self
    }

    pub fn extract_count(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn analyze_count(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.extract_count() + self.analyze_count()
    }

    pub fn last_request(&self) -> Option<AnalysisRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for MockReasoning {
    async fn extract_text(&self, image: &DocumentImage) -> std::result::Result<OcrExtraction, CallError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(&image.bytes)
            .cloned()
            .ok_or_else(|| CallError::new(ErrorCategory::BadInput, "unrecognized test image"))
    }

    async fn analyze(&self, request: &AnalysisRequest) -> std::result::Result<String, CallError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if let Some(delay) = self.analyze_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.analysis.clone())
    }
}
