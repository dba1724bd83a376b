//! Text Normalizer
//!
//! Shared normalization used by the template matcher, the party matcher and
//! the document relationship detector. Handles mixed English/Thai text.
//!
//! - `normalize_text`: lowercase, punctuation to spaces, collapsed whitespace
//! - `normalize_party_name`: additionally strips legal-entity markers and
//!   folds connector words/symbols to a single `and` token
//! - `normalize_tax_id`: identifier characters only

pub use crate::models::parse_amount;

/// Thai legal-entity markers, longest first so compound forms win
const THAI_LEGAL_MARKERS: &[&str] = &[
    "บริษัทมหาชนจำกัด",
    "ห้างหุ้นส่วนจำกัด",
    "ห้างหุ้นส่วนสามัญ",
    "ห้างหุ้นส่วน",
    "บริษัท",
    "จำกัด",
    "มหาชน",
    "หจก.",
    "บจก.",
    "บมจ.",
    "หจก",
    "บจก",
    "บมจ",
];

/// English legal-entity tokens (after punctuation removal)
const ENGLISH_LEGAL_TOKENS: &[&str] = &[
    "company",
    "co",
    "ltd",
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "llc",
    "plc",
    "pcl",
    "lp",
    "llp",
    "partnership",
];

/// Dropped only next to another legal token ("public company limited"), or
/// as the final token ("Acme Limited")
const ENGLISH_LEGAL_QUALIFIERS: &[&str] = &["public", "limited"];

const CONNECTOR: &str = "and";

/// Lowercase, replace punctuation with spaces, collapse whitespace
///
/// Letters and digits of any script survive, as do combining marks (Thai
/// vowel and tone marks are combining characters).
pub fn normalize_text(text: &str) -> String {
    let lowered = collapse_repeated_marks(&text.to_lowercase());
    let mapped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || is_combining_mark(c) {
                c
            } else {
                ' '
            }
        })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a counterparty name for comparison
///
/// "ACME Co., Ltd." and "บริษัท แอคมี จำกัด (มหาชน)" lose their legal markers;
/// `&`, `+` and `และ` all become `and`.
pub fn normalize_party_name(name: &str) -> String {
    let mut text = collapse_repeated_marks(&name.to_lowercase());

    for marker in THAI_LEGAL_MARKERS {
        text = text.replace(marker, " ");
    }

    text = text
        .replace('&', " and ")
        .replace('+', " and ")
        .replace("และ", " and ");

    let normalized = normalize_text(&text);
    let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();

    let is_legal = |t: &str| ENGLISH_LEGAL_TOKENS.contains(&t);
    let mut kept: Vec<&str> = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if is_legal(*token) {
            continue;
        }
        if ENGLISH_LEGAL_QUALIFIERS.contains(token) {
            let prev_legal = i > 0 && is_legal(tokens[i - 1]);
            let next_legal = tokens.get(i + 1).map(|t| is_legal(*t)).unwrap_or(false);
            let trailing = *token == "limited" && i + 1 == tokens.len();
            if prev_legal || next_legal || trailing {
                continue;
            }
        }
        kept.push(*token);
    }

    // Connector only at the edges carries no identity
    while kept.first() == Some(&CONNECTOR) {
        kept.remove(0);
    }
    while kept.last() == Some(&CONNECTOR) {
        kept.pop();
    }

    kept.join(" ")
}

/// Strip separators and whitespace from a tax identifier
pub fn normalize_tax_id(tax_id: &str) -> String {
    tax_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Whitespace tokens of normalized text, without stop words
pub fn tokens(text: &str) -> Vec<String> {
    const STOP_WORDS: &[&str] = &[
        "a", "an", "the", "of", "for", "and", "to", "in", "on", "at", "by", "with",
    ];

    normalize_text(text)
        .split(' ')
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token lists (0.0-1.0)
pub fn token_jaccard(a: &[String], b: &[String]) -> f64 {
    use std::collections::HashSet;

    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// True when `needle` occurs in `haystack` as whole words (ASCII) or as a
/// substring (other scripts, which are not space-delimited)
pub fn contains_term(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    if needle.is_ascii() {
        let padded = format!(" {} ", haystack);
        padded.contains(&format!(" {} ", needle))
    } else {
        haystack.contains(needle)
    }
}

/// Drop immediate repeats of the same combining mark
///
/// OCR of Thai text frequently doubles tone marks ("ก่่"), which would
/// otherwise cost edit distance.
pub fn collapse_repeated_marks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if is_combining_mark(c) && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

fn is_combining_mark(c: char) -> bool {
    matches!(c,
        '\u{0300}'..='\u{036F}'
        | '\u{0E31}'
        | '\u{0E34}'..='\u{0E3A}'
        | '\u{0E47}'..='\u{0E4E}'
    )
}
