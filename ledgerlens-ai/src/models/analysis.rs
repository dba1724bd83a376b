//! Per-request analysis types
//!
//! Inputs (images), intermediate results (OCR extractions, document category,
//! reference subset) and the typed form of the reasoning service's structured
//! output.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use uuid::Uuid;

use super::entry::AccountingEntryLine;
use super::reference::{Account, EntryTemplate, Journal, Party, PartyRole};

/// Photographed document page submitted for analysis
#[derive(Debug, Clone)]
pub struct DocumentImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl DocumentImage {
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
            file_name: None,
        }
    }

    /// Read an image file, guessing the MIME type from its extension
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("heic") => "image/heic",
            Some("pdf") => "application/pdf",
            _ => "image/jpeg",
        };

        Ok(Self {
            bytes,
            mime_type: mime_type.to_string(),
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        })
    }
}

/// Text and quality signals extracted from one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrExtraction {
    #[serde(default)]
    pub text: String,
    /// 0-100
    #[serde(default)]
    pub confidence: f64,
    /// Quality problems reported by the extractor (blur, glare, cropping...)
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Where the document's main category phrase came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySource {
    /// Statutory income-type field of a withholding-tax certificate
    IncomeType,
    /// Goods/service line-item description
    LineItem,
    /// First meaningful content line
    Heading,
    /// Nothing usable found
    Unknown,
}

/// Short phrase describing what the document is for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCategory {
    pub phrase: String,
    pub source: CategorySource,
    pub withholding_certificate: bool,
}

/// How a multi-image submission relates its pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRelationship {
    SingleDocument,
    /// Receipt/invoice plus a payment slip for the same total
    ReceiptWithPaymentProof,
    MultiPageDocument,
    SeparateDocuments,
}

impl DocumentRelationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentRelationship::SingleDocument => "single_document",
            DocumentRelationship::ReceiptWithPaymentProof => "receipt_with_payment_proof",
            DocumentRelationship::MultiPageDocument => "multi_page_document",
            DocumentRelationship::SeparateDocuments => "separate_documents",
        }
    }
}

/// How much reference data the reasoning service may draw on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Exactly the matched template's accounts, no additions or omissions
    TemplateOnly,
    /// Any valid account from the full chart
    FreeAnalysis,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::TemplateOnly => "template_only",
            AnalysisMode::FreeAnalysis => "free_analysis",
        }
    }
}

/// Reference data disclosed to the reasoning service for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceSubset {
    pub accounts: Vec<Account>,
    pub journals: Vec<Journal>,
    pub creditors: Vec<Party>,
    pub debtors: Vec<Party>,
    pub templates: Vec<EntryTemplate>,
    pub profile: Option<String>,
}

/// Payload of the structuring call
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub request_id: Uuid,
    pub tenant_id: String,
    pub mode: AnalysisMode,
    /// Consolidated OCR text, pages separated by markers
    pub document_text: String,
    pub page_count: usize,
    pub relationship: DocumentRelationship,
    pub category: Option<String>,
    /// Matched template (template-only mode)
    pub template: Option<EntryTemplate>,
    pub reference: ReferenceSubset,
}

/// Receipt-level fields of the structured result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptFields {
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub document_date: Option<String>,
    #[serde(default)]
    pub issuer_name: Option<String>,
    #[serde(default)]
    pub issuer_tax_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_amount")]
    pub total_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_amount")]
    pub vat_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Counterparty as extracted from the document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterpartyFields {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub role: PartyRole,
}

/// Proposed accounting entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFields {
    #[serde(default)]
    pub journal_code: Option<String>,
    #[serde(default)]
    pub entry_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entries: Vec<AccountingEntryLine>,
}

/// Typed form of the reasoning service's structured output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub receipt: ReceiptFields,
    #[serde(default)]
    pub counterparty: CounterpartyFields,
    #[serde(default)]
    pub accounting_entry: EntryFields,
    /// Recovered through the degraded parse path
    #[serde(skip_deserializing, default)]
    pub partial: bool,
}

/// Parse a printed amount such as `1,070.00`, `฿ 535.50` or `1.070,00`
///
/// When both separators appear, the last one is the decimal point. A lone
/// comma is a decimal point only when exactly two digits follow it.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(c), None) if cleaned.len() - c - 1 == 2 => cleaned.replace(',', "."),
        (Some(_), None) => cleaned.replace(',', ""),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok()
}

/// Accept an amount as a JSON number, a printed string, or null
pub(crate) fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_amount(deserializer)?.unwrap_or(0.0))
}

pub(crate) fn lenient_optional_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_amount(&s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("1,070.00"), Some(1070.0));
        assert_eq!(parse_amount("฿ 535.50"), Some(535.5));
        assert_eq!(parse_amount("1.070,00"), Some(1070.0));
        assert_eq!(parse_amount("12,50"), Some(12.5));
        assert_eq!(parse_amount("12,500"), Some(12500.0));
        assert_eq!(parse_amount("THB"), None);
    }

    #[test]
    fn test_structured_analysis_accepts_string_amounts() {
        let json = r#"{
            "document_type": "tax_invoice",
            "receipt": { "document_number": "INV-1", "total_amount": "1,070.00" },
            "accounting_entry": {
                "journal_code": "PJ",
                "entries": [
                    { "account_code": "5100", "account_label": "Fuel", "debit": "1,000.00" },
                    { "account_code": "1155", "account_label": "Input VAT", "debit": 70 },
                    { "account_code": "2100", "account_label": "Payable", "credit": 1070.0 }
                ]
            }
        }"#;

        let parsed: StructuredAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.receipt.total_amount, Some(1070.0));
        assert_eq!(parsed.accounting_entry.entries.len(), 3);
        assert_eq!(parsed.accounting_entry.entries[0].debit, 1000.0);
        assert_eq!(parsed.accounting_entry.entries[2].credit, 1070.0);
        assert_eq!(parsed.counterparty.role, PartyRole::Creditor);
        assert!(!parsed.partial);
    }
}
