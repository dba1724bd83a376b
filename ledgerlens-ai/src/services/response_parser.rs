//! Reasoning-service response parsing
//!
//! The reasoning service usually returns a JSON object, sometimes wrapped in
//! a Markdown fence or surrounded by prose. Occasionally the output is cut
//! off mid-object or arrives as plain text. Parsing order:
//!
//! 1. Strict: the slice from the first `{` to the last `}` deserializes
//! 2. Repair: close the open strings, arrays and objects of a truncated
//!    object, dropping trailing members until it deserializes
//! 3. Scrape: pick labelled fields and `code label debit credit` lines out
//!    of plain text
//!
//! Anything recovered by steps 2 or 3 is flagged `partial`.

use thiserror::Error;

use crate::models::{parse_amount, AccountingEntryLine, StructuredAnalysis};

/// Trailing members dropped before giving up on a truncated object
const MAX_REPAIR_CUTS: usize = 32;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Reasoning service returned an empty response")]
    Empty,

    #[error("No structured fields could be recovered from the response: {0}")]
    Unrecoverable(String),
}

/// Parse a raw reasoning-service response into a [`StructuredAnalysis`]
///
/// # Errors
/// `Empty` for a blank response, `Unrecoverable` when neither the strict
/// path nor the degraded path yields any structured field.
pub fn parse(raw: &str) -> Result<StructuredAnalysis, ParseError> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let strict_error = match object_slice(body) {
        Some(json) => match serde_json::from_str::<StructuredAnalysis>(json) {
            Ok(analysis) => return Ok(analysis),
            Err(e) => e.to_string(),
        },
        None => "no JSON object found".to_string(),
    };

    tracing::warn!(
        error = %strict_error,
        response_len = body.len(),
        "Structured response did not parse, trying degraded extraction"
    );

    if let Some(mut analysis) = body.find('{').and_then(|start| repair_truncated(&body[start..])) {
        if has_content(&analysis) {
            analysis.partial = true;
            tracing::info!(
                entries = analysis.accounting_entry.entries.len(),
                "Recovered truncated structured response"
            );
            return Ok(analysis);
        }
    }

    let mut analysis = scrape_plain_text(body);
    if has_content(&analysis) {
        analysis.partial = true;
        tracing::info!(
            entries = analysis.accounting_entry.entries.len(),
            "Recovered fields from plain-text response"
        );
        return Ok(analysis);
    }

    Err(ParseError::Unrecoverable(strict_error))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    // Skip the info string (`json`, `JSON`, ...)
    let content = match after.find('\n') {
        Some(nl) => &after[nl + 1..],
        None => after,
    };
    match content.rfind("```") {
        Some(end) => content[..end].trim(),
        None => content.trim(),
    }
}

fn object_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn has_content(analysis: &StructuredAnalysis) -> bool {
    analysis.receipt.document_number.is_some()
        || analysis.receipt.total_amount.is_some()
        || analysis.accounting_entry.journal_code.is_some()
        || !analysis.accounting_entry.entries.is_empty()
}

// ============================================================================
// Truncated JSON repair
// ============================================================================

struct JsonScan {
    /// Closers for every open array/object, innermost last
    closers: Vec<char>,
    in_string: bool,
    /// Text ends on a backslash inside a string
    dangling_escape: bool,
    /// Byte offset of the last comma outside any string
    last_comma: Option<usize>,
}

fn scan_json(text: &str) -> JsonScan {
    let mut scan = JsonScan {
        closers: Vec::new(),
        in_string: false,
        dangling_escape: false,
        last_comma: None,
    };

    for (i, c) in text.char_indices() {
        if scan.in_string {
            if scan.dangling_escape {
                scan.dangling_escape = false;
            } else if c == '\\' {
                scan.dangling_escape = true;
            } else if c == '"' {
                scan.in_string = false;
            }
            continue;
        }

        match c {
            '"' => scan.in_string = true,
            '{' => scan.closers.push('}'),
            '[' => scan.closers.push(']'),
            '}' | ']' => {
                scan.closers.pop();
            }
            ',' => scan.last_comma = Some(i),
            _ => {}
        }
    }

    scan
}

/// Close whatever the truncation left open
fn close_json(text: &str, scan: &JsonScan) -> String {
    let mut repaired = text.to_string();

    if scan.in_string {
        if scan.dangling_escape {
            repaired.pop();
        }
        repaired.push('"');
    }

    loop {
        let len = repaired.trim_end().len();
        repaired.truncate(len);
        match repaired.chars().last() {
            Some(',') => {
                repaired.pop();
            }
            Some(':') => {
                repaired.push_str(" null");
                break;
            }
            _ => break,
        }
    }

    for closer in scan.closers.iter().rev() {
        repaired.push(*closer);
    }
    repaired
}

fn repair_truncated(text: &str) -> Option<StructuredAnalysis> {
    let mut candidate = text;

    for _ in 0..MAX_REPAIR_CUTS {
        let scan = scan_json(candidate);
        let repaired = close_json(candidate, &scan);
        if let Ok(analysis) = serde_json::from_str::<StructuredAnalysis>(&repaired) {
            return Some(analysis);
        }

        // Drop the last (possibly half-written) member and try again
        candidate = &candidate[..scan.last_comma?];
    }

    None
}

// ============================================================================
// Plain-text scraping
// ============================================================================

const DOCUMENT_NUMBER_LABELS: &[&str] = &[
    "document_number",
    "document number",
    "document no",
    "invoice number",
    "invoice no",
    "receipt number",
    "receipt no",
    "reference number",
    "เลขที่",
];

const DATE_LABELS: &[&str] = &[
    "document_date",
    "document date",
    "invoice date",
    "entry_date",
    "date",
    "วันที่",
];

const TOTAL_LABELS: &[&str] = &[
    "total_amount",
    "total amount",
    "grand total",
    "total",
    "รวมทั้งสิ้น",
    "ยอดรวม",
];

const JOURNAL_LABELS: &[&str] = &["journal_code", "journal code", "journal", "สมุดรายวัน"];

const DOCUMENT_TYPE_LABELS: &[&str] = &["document_type", "document type"];

fn scrape_plain_text(text: &str) -> StructuredAnalysis {
    let mut analysis = StructuredAnalysis::default();

    for raw_line in text.lines() {
        let line = raw_line
            .trim()
            .trim_start_matches(|c: char| c == '"' || c == '-' || c == '*' || c.is_whitespace())
            .trim_end_matches(|c: char| c == ',' || c.is_whitespace());
        if line.is_empty() {
            continue;
        }

        if let Some(entry) = entry_line(line) {
            analysis.accounting_entry.entries.push(entry);
            continue;
        }

        if analysis.receipt.document_number.is_none() {
            if let Some(value) = labelled(line, DOCUMENT_NUMBER_LABELS) {
                analysis.receipt.document_number = first_token(value);
                continue;
            }
        }
        if analysis.receipt.document_date.is_none() {
            if let Some(value) = labelled(line, DATE_LABELS) {
                analysis.receipt.document_date = first_token(value);
                continue;
            }
        }
        if analysis.receipt.total_amount.is_none() {
            if let Some(value) = labelled(line, TOTAL_LABELS) {
                analysis.receipt.total_amount = parse_amount(value);
                continue;
            }
        }
        if analysis.accounting_entry.journal_code.is_none() {
            if let Some(value) = labelled(line, JOURNAL_LABELS) {
                analysis.accounting_entry.journal_code = first_token(value);
                continue;
            }
        }
        if analysis.document_type.is_none() {
            if let Some(value) = labelled(line, DOCUMENT_TYPE_LABELS) {
                analysis.document_type = first_token(value);
            }
        }
    }

    analysis
}

/// Value following a label at the start of the line
fn labelled<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    labels.iter().find_map(|label| {
        let prefix = line.get(..label.len())?;
        if !prefix.eq_ignore_ascii_case(label) {
            return None;
        }
        let rest = &line[label.len()..];
        // The label must end at a separator, not mid-word
        if !rest.starts_with(|c: char| matches!(c, ':' | '=' | '#' | '"' | '.') || c.is_whitespace())
        {
            return None;
        }
        let value = rest
            .trim_start_matches(|c: char| matches!(c, ':' | '=' | '#' | '"' | '.') || c.is_whitespace())
            .trim_end_matches(|c: char| c == '"' || c == ',');
        (!value.is_empty()).then_some(value)
    })
}

fn first_token(value: &str) -> Option<String> {
    value
        .split_whitespace()
        .next()
        .map(|t| t.trim_matches(|c: char| c == '"' || c == ',').to_string())
        .filter(|t| !t.is_empty() && t != "null")
}

/// `5100 Fuel expense 1,000.00 0.00` or the same with `|` separators
fn entry_line(line: &str) -> Option<AccountingEntryLine> {
    let tokens: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == '|')
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() < 4 || !is_account_code(tokens[0]) {
        return None;
    }

    let n = tokens.len();
    let debit = amount_token(tokens[n - 2])?;
    let credit = amount_token(tokens[n - 1])?;
    let label = tokens[1..n - 2].join(" ");

    Some(AccountingEntryLine {
        account_code: tokens[0].to_string(),
        account_label: label,
        debit,
        credit,
    })
}

fn is_account_code(token: &str) -> bool {
    let separators = token.chars().filter(|c| matches!(c, '-' | '.')).count();
    token.len() >= 3
        && token.starts_with(|c: char| c.is_ascii_digit())
        && separators <= 1
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '.'))
}

fn amount_token(token: &str) -> Option<f64> {
    if token == "-" {
        return Some(0.0);
    }
    if !token
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.'))
    {
        return None;
    }
    parse_amount(token)
}
