//! Document Relationship Detector
//!
//! Classifies each extracted page, pulls out its printed total and decides
//! how the pages of one submission relate:
//!
//! | Pages | Relationship |
//! |---|---|
//! | one | `single_document` |
//! | receipt/invoice + payment slip, totals equal within 0.01 | `receipt_with_payment_proof` |
//! | page markers, or no totals after the first page | `multi_page_document` |
//! | anything else | `separate_documents` |
//!
//! Pages are consolidated in their original order, separated by
//! `--- page N ---` markers.

use serde::Serialize;

use crate::models::{parse_amount, DocumentRelationship};
use crate::services::template_matcher::WITHHOLDING_MARKERS;
use crate::services::text_normalizer::{contains_term, normalize_text};

/// Totals closer than this are the same amount
pub const TOTAL_TOLERANCE: f64 = 0.01;

const RECEIPT_MARKERS: &[&str] = &[
    "receipt",
    "tax invoice",
    "invoice",
    "cash sale",
    "bill",
    "ใบเสร็จรับเงิน",
    "ใบเสร็จ",
    "ใบกำกับภาษี",
    "ใบแจ้งหนี้",
];

const PAYMENT_SLIP_MARKERS: &[&str] = &[
    "transfer",
    "transfer successful",
    "payment slip",
    "transaction",
    "promptpay",
    "from account",
    "to account",
    "โอนเงิน",
    "โอนเงินสำเร็จ",
    "รายการสำเร็จ",
    "พร้อมเพย์",
];

/// Total labels, strongest first
const TOTAL_LABELS: &[&str] = &[
    "grand total",
    "total amount",
    "net total",
    "รวมทั้งสิ้น",
    "ยอดรวม",
    "จำนวนเงิน",
    "ยอดเงิน",
    "total",
    "amount",
    "รวม",
];

/// What a single page appears to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    /// Receipt, tax invoice or bill
    Receipt,
    /// Bank transfer or payment confirmation
    PaymentSlip,
    WithholdingCertificate,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub index: usize,
    pub kind: PageKind,
    pub total: Option<f64>,
    /// "page 2 of 3", "หน้า 2/3", "continued"
    pub has_page_marker: bool,
}

/// Relationship plus the consolidated text handed to later stages
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub pages: Vec<PageSummary>,
    pub relationship: DocumentRelationship,
    pub consolidated_text: String,
}

/// Summarize, relate and consolidate pages given in submission order
pub fn analyze_pages(page_texts: &[String]) -> PageAnalysis {
    let pages: Vec<PageSummary> = page_texts
        .iter()
        .enumerate()
        .map(|(index, text)| summarize_page(index, text))
        .collect();
    let relationship = detect_relationship(&pages);

    tracing::debug!(
        pages = pages.len(),
        relationship = relationship.as_str(),
        "Document relationship detected"
    );

    PageAnalysis {
        pages,
        relationship,
        consolidated_text: consolidate(page_texts),
    }
}

pub fn summarize_page(index: usize, text: &str) -> PageSummary {
    let normalized = normalize_text(text);
    PageSummary {
        index,
        kind: classify_page(&normalized),
        total: extract_total(text),
        has_page_marker: has_page_marker(&normalized),
    }
}

pub fn detect_relationship(pages: &[PageSummary]) -> DocumentRelationship {
    if pages.len() <= 1 {
        return DocumentRelationship::SingleDocument;
    }

    let totals_of = |kind: PageKind| -> Vec<f64> {
        pages
            .iter()
            .filter(|p| p.kind == kind)
            .filter_map(|p| p.total)
            .collect()
    };
    let receipt_totals = totals_of(PageKind::Receipt);
    let slip_totals = totals_of(PageKind::PaymentSlip);

    let paid_in_full = receipt_totals
        .iter()
        .any(|r| slip_totals.iter().any(|s| (r - s).abs() < TOTAL_TOLERANCE));
    if paid_in_full {
        return DocumentRelationship::ReceiptWithPaymentProof;
    }

    let continuation = pages[1..].iter().all(|p| p.total.is_none());
    if continuation || pages.iter().any(|p| p.has_page_marker) {
        return DocumentRelationship::MultiPageDocument;
    }

    DocumentRelationship::SeparateDocuments
}

/// Join page texts in order with `--- page N ---` separators
///
/// A single page is returned as-is.
pub fn consolidate(page_texts: &[String]) -> String {
    if page_texts.len() == 1 {
        return page_texts[0].clone();
    }

    page_texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("--- page {} ---\n{}", i + 1, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn classify_page(normalized: &str) -> PageKind {
    let hits = |markers: &[&str]| {
        markers
            .iter()
            .filter(|m| contains_term(normalized, &normalize_text(m)))
            .count()
    };

    if hits(WITHHOLDING_MARKERS) > 0 {
        return PageKind::WithholdingCertificate;
    }

    let receipt = hits(RECEIPT_MARKERS);
    let slip = hits(PAYMENT_SLIP_MARKERS);
    if receipt > 0 && receipt >= slip {
        PageKind::Receipt
    } else if slip > 0 {
        PageKind::PaymentSlip
    } else {
        PageKind::Other
    }
}

/// Printed total of a page
///
/// Labels are tried strongest first; for each label the last line carrying
/// an amount wins (grand totals are printed last).
pub fn extract_total(text: &str) -> Option<f64> {
    let lines: Vec<String> = text.lines().map(|l| l.trim().to_lowercase()).collect();

    TOTAL_LABELS.iter().find_map(|label| {
        lines.iter().enumerate().rev().find_map(|(i, line)| {
            let pos = find_label(line, label)?;
            last_amount(&line[pos + label.len()..])
                .or_else(|| lines.get(i + 1).and_then(|next| last_amount(next)))
        })
    })
}

/// Label position, rejecting ASCII labels glued to a preceding word
/// ("subtotal" does not carry "total")
fn find_label(line: &str, label: &str) -> Option<usize> {
    line.match_indices(label).map(|(pos, _)| pos).find(|&pos| {
        !label.is_ascii()
            || line[..pos]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric())
    })
}

fn last_amount(text: &str) -> Option<f64> {
    text.split_whitespace().rev().find_map(|token| {
        let token = token.trim_matches(|c: char| !c.is_ascii_digit());
        if token.is_empty()
            || !token
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.'))
        {
            return None;
        }
        parse_amount(token)
    })
}

fn has_page_marker(normalized: &str) -> bool {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let is_number = |t: &str| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit());

    tokens.contains(&"continued")
        || tokens.windows(3).any(|w| {
            matches!(w[0], "page" | "หน้า")
                && is_number(w[1])
                && (matches!(w[2], "of" | "จาก") || is_number(w[2]))
        })
}
