//! Template Matcher
//!
//! Scores a document against the tenant's entry templates and decides between
//! template-only and free-analysis mode.
//!
//! **Pipeline:**
//! 1. Derive the document's main category phrase (income-type field for
//!    withholding-tax certificates, otherwise the first line-item description,
//!    otherwise the first meaningful content line)
//! 2. Score the category against each template description
//! 3. Force templates that name a counterparty to 0 unless that party is the
//!    document's issuer
//! 4. Best score >= threshold selects template-only mode; ties go to the
//!    template listed first

use once_cell::sync::Lazy;

use crate::models::{
    round2, AnalysisMode, CategorySource, DocumentCategory, EntryTemplate, MatchResult, Party,
};
use crate::services::text_normalizer::{
    contains_term, normalize_party_name, normalize_text, token_jaccard, tokens,
};

/// Default minimum confidence for template-only mode
pub const DEFAULT_TEMPLATE_THRESHOLD: f64 = 85.0;

const EXACT_SCORE: f64 = 100.0;
const CONTAINMENT_SCORE: f64 = 95.0;
const SHARED_CONCEPT_BASE: f64 = 88.0;
const SHARED_CONCEPT_BONUS: f64 = 9.0;
const DISJOINT_CONCEPT_CAP: f64 = 40.0;

// ============================================================================
// Vocabulary
// ============================================================================

/// Semantic concept groups; a phrase belongs to every group it mentions
static CONCEPTS: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "fuel",
            vec![
                "fuel", "gasoline", "petrol", "diesel", "gas station", "gasohol", "น้ำมัน",
                "เชื้อเพลิง", "ดีเซล", "เบนซิน", "แก๊สโซฮอล์",
            ],
        ),
        (
            "utilities",
            vec![
                "electricity", "electric", "water supply", "water bill", "utility", "utilities",
                "ค่าไฟ", "ไฟฟ้า", "ค่าน้ำประปา", "ประปา",
            ],
        ),
        (
            "telecom",
            vec![
                "telephone", "phone", "mobile", "internet", "broadband", "telecom", "โทรศัพท์",
                "อินเทอร์เน็ต", "อินเตอร์เน็ต",
            ],
        ),
        ("rent", vec!["rent", "rental", "lease", "ค่าเช่า", "เช่า"]),
        (
            "transport",
            vec![
                "transport", "transportation", "freight", "shipping", "delivery", "courier",
                "logistics", "postage", "ขนส่ง", "ค่าส่ง", "จัดส่ง", "ไปรษณีย์",
            ],
        ),
        (
            "advertising",
            vec![
                "advertising", "advertisement", "marketing", "promotion", "ads", "โฆษณา",
                "การตลาด",
            ],
        ),
        (
            "office_supplies",
            vec![
                "office supplies", "stationery", "paper", "toner", "ink cartridge", "เครื่องเขียน",
                "อุปกรณ์สำนักงาน", "วัสดุสำนักงาน",
            ],
        ),
        (
            "meals",
            vec![
                "meal", "meals", "food", "restaurant", "catering", "coffee", "beverage", "อาหาร",
                "เครื่องดื่ม", "ร้านอาหาร",
            ],
        ),
        (
            "travel",
            vec![
                "travel", "hotel", "accommodation", "airfare", "flight", "taxi", "เดินทาง",
                "โรงแรม", "ที่พัก", "ตั๋วเครื่องบิน",
            ],
        ),
        (
            "repairs",
            vec![
                "repair", "repairs", "maintenance", "servicing", "ซ่อม", "บำรุงรักษา",
            ],
        ),
        (
            "professional_services",
            vec![
                "consulting", "consultancy", "consultant", "legal", "audit", "accounting service",
                "professional fee", "professional fees", "ที่ปรึกษา", "ตรวจสอบบัญชี", "ค่าวิชาชีพ",
                "ทนายความ",
            ],
        ),
        (
            "software",
            vec![
                "software", "subscription", "license", "licence", "cloud", "hosting", "saas",
                "ซอฟต์แวร์", "โปรแกรม",
            ],
        ),
        ("insurance", vec!["insurance", "premium", "ประกันภัย", "ประกัน"]),
        (
            "payroll",
            vec!["salary", "salaries", "wage", "wages", "payroll", "bonus", "เงินเดือน", "ค่าแรง"],
        ),
    ]
});

/// Concept pairs that must never be matched to each other
const UNRELATED_CONCEPTS: &[(&str, &str)] = &[
    ("fuel", "software"),
    ("fuel", "professional_services"),
    ("fuel", "rent"),
    ("fuel", "insurance"),
    ("fuel", "payroll"),
    ("meals", "rent"),
    ("meals", "software"),
    ("meals", "insurance"),
    ("utilities", "advertising"),
    ("telecom", "rent"),
    ("office_supplies", "travel"),
    ("payroll", "advertising"),
    ("professional_services", "office_supplies"),
    ("repairs", "insurance"),
];

pub(crate) const WITHHOLDING_MARKERS: &[&str] = &[
    "withholding tax certificate",
    "certificate of tax withheld",
    "certificate of withholding",
    "50 bis",
    "หนังสือรับรองการหักภาษี",
    "50 ทวิ",
];

const INCOME_TYPE_LABELS: &[&str] = &["type of income", "income type", "ประเภทเงินได้"];

/// Statutory income categories recognized on withholding certificates
const INCOME_TYPE_KEYWORDS: &[&str] = &[
    "service fee",
    "professional fee",
    "commission",
    "rent",
    "advertising",
    "transport",
    "contract work",
    "royalty",
    "interest",
    "dividend",
    "salary",
    "ค่าบริการ",
    "ค่าวิชาชีพ",
    "ค่านายหน้า",
    "ค่าเช่า",
    "ค่าโฆษณา",
    "ค่าขนส่ง",
    "ค่าจ้างทำของ",
    "ค่าลิขสิทธิ์",
    "ดอกเบี้ย",
    "เงินปันผล",
    "เงินเดือน",
];

const ITEM_HEADER_MARKERS: &[&str] = &[
    "description",
    "particulars",
    "item",
    "items",
    "รายการ",
    "รายละเอียด",
];

/// Lines that describe who/when/how much rather than what was bought
const NON_CATEGORY_MARKERS: &[&str] = &[
    "co ltd",
    "company",
    "limited",
    "บริษัท",
    "จำกัด",
    "tax id",
    "tax identification",
    "เลขประจำตัวผู้เสียภาษี",
    "address",
    "ที่อยู่",
    "date",
    "วันที่",
    "total",
    "รวม",
    "tel",
    "phone",
    "โทร",
    "invoice",
    "receipt",
    "ใบเสร็จ",
    "ใบกำกับ",
    "no",
    "เลขที่",
    "branch",
    "สาขา",
    "page",
];

const BUYER_MARKERS: &[&str] = &[
    "bill to",
    "billed to",
    "sold to",
    "ship to",
    "customer",
    "buyer",
    "payer",
    "received from",
    "ลูกค้า",
    "ผู้ซื้อ",
    "ผู้จ่ายเงิน",
    "ได้รับเงินจาก",
];

const ISSUER_LABELS: &[&str] = &[
    "issued by",
    "seller",
    "vendor",
    "supplier",
    "ผู้ขาย",
    "ผู้ออก",
    "ผู้ให้บริการ",
];

// ============================================================================
// Results
// ============================================================================

/// Where a template's named counterparty was found in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuerCheck {
    /// Issuer section or issuer-labelled line
    Issuer,
    /// Only after a buyer/payer marker
    PayerOnly,
    Absent,
}

/// Score of one template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateScore {
    pub template_id: String,
    pub confidence: f64,
    pub rationale: String,
}

/// Template matching outcome plus the mode it implies
#[derive(Debug, Clone)]
pub struct TemplateDecision {
    pub result: MatchResult,
    pub mode: AnalysisMode,
    /// Matched template (template-only mode)
    pub template: Option<EntryTemplate>,
    pub category: DocumentCategory,
    /// Every template's score, in template order
    pub scores: Vec<TemplateScore>,
}

// ============================================================================
// Matcher
// ============================================================================

/// Template Matcher
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    threshold: f64,
}

impl TemplateMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Match a document against the tenant's templates
    ///
    /// # Arguments
    /// * `document_text` - Consolidated OCR text of all pages
    /// * `templates` - Tenant templates, in priority order
    /// * `parties` - Known parties, used to expand a template counterparty
    ///   given as a party code into its name variants
    pub fn match_document(
        &self,
        document_text: &str,
        templates: &[EntryTemplate],
        parties: &[Party],
    ) -> TemplateDecision {
        let category = derive_category(document_text);

        let scores: Vec<TemplateScore> = templates
            .iter()
            .map(|t| self.score_template(document_text, &category, t, parties))
            .collect();

        let mut best: Option<(usize, f64)> = None;
        for (i, score) in scores.iter().enumerate() {
            if best.map(|(_, s)| score.confidence > s).unwrap_or(true) {
                best = Some((i, score.confidence));
            }
        }

        let decision = match best {
            Some((i, confidence)) if confidence >= self.threshold => {
                let template = &templates[i];
                let rationale = scores[i].rationale.clone();
                let result = if confidence >= EXACT_SCORE {
                    MatchResult::exact(&template.description, &template.id, rationale)
                } else {
                    MatchResult::fuzzy(&template.description, &template.id, confidence, rationale)
                };
                TemplateDecision {
                    result,
                    mode: AnalysisMode::TemplateOnly,
                    template: Some(template.clone()),
                    category,
                    scores,
                }
            }
            Some((i, confidence)) => {
                let result = MatchResult::not_found(format!(
                    "Best template '{}' scored {:.2}, below {:.0}",
                    templates[i].id, confidence, self.threshold
                ));
                TemplateDecision {
                    result,
                    mode: AnalysisMode::FreeAnalysis,
                    template: None,
                    category,
                    scores,
                }
            }
            None => TemplateDecision {
                result: MatchResult::not_found("Tenant has no entry templates"),
                mode: AnalysisMode::FreeAnalysis,
                template: None,
                category,
                scores,
            },
        };

        tracing::debug!(
            category = %decision.category.phrase,
            mode = decision.mode.as_str(),
            confidence = decision.result.confidence,
            template = ?decision.template.as_ref().map(|t| t.id.as_str()),
            "Template matching complete"
        );

        decision
    }

    fn score_template(
        &self,
        document_text: &str,
        category: &DocumentCategory,
        template: &EntryTemplate,
        parties: &[Party],
    ) -> TemplateScore {
        if let Some(counterparty) = template.counterparty.as_deref() {
            let names = counterparty_names(counterparty, parties);
            match locate_party(document_text, &names) {
                IssuerCheck::Issuer => {}
                IssuerCheck::PayerOnly => {
                    return TemplateScore {
                        template_id: template.id.clone(),
                        confidence: 0.0,
                        rationale: format!(
                            "Counterparty '{}' appears as customer/payer, not issuer",
                            counterparty
                        ),
                    };
                }
                IssuerCheck::Absent => {
                    return TemplateScore {
                        template_id: template.id.clone(),
                        confidence: 0.0,
                        rationale: format!(
                            "Counterparty '{}' not confirmed as document issuer",
                            counterparty
                        ),
                    };
                }
            }
        }

        let (confidence, rationale) = score_phrase(&category.phrase, &template.description);
        TemplateScore {
            template_id: template.id.clone(),
            confidence,
            rationale,
        }
    }
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_THRESHOLD)
    }
}

// ============================================================================
// Category derivation
// ============================================================================

/// Derive the document's main category phrase
pub fn derive_category(document_text: &str) -> DocumentCategory {
    let lines: Vec<&str> = document_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !is_page_marker(l))
        .collect();
    let normalized_text = normalize_text(document_text);

    if WITHHOLDING_MARKERS
        .iter()
        .any(|m| contains_term(&normalized_text, &normalize_text(m)))
    {
        let phrase = income_type_phrase(&lines).unwrap_or_default();
        return DocumentCategory {
            source: if phrase.is_empty() {
                CategorySource::Unknown
            } else {
                CategorySource::IncomeType
            },
            phrase,
            withholding_certificate: true,
        };
    }

    if let Some(phrase) = line_item_phrase(&lines) {
        return DocumentCategory {
            phrase,
            source: CategorySource::LineItem,
            withholding_certificate: false,
        };
    }

    match lines.iter().find(|l| is_content_line(l)) {
        Some(line) => DocumentCategory {
            phrase: clean_item_line(line),
            source: CategorySource::Heading,
            withholding_certificate: false,
        },
        None => DocumentCategory {
            phrase: String::new(),
            source: CategorySource::Unknown,
            withholding_certificate: false,
        },
    }
}

fn is_page_marker(line: &str) -> bool {
    line.starts_with("--- page") || line.starts_with("=== page")
}

/// Labelled income-type value, or the first income keyword in the text
fn income_type_phrase(lines: &[&str]) -> Option<String> {
    for (i, line) in lines.iter().enumerate() {
        let lowered = line.to_lowercase();
        for label in INCOME_TYPE_LABELS {
            if let Some(pos) = lowered.find(label) {
                let value = labelled_value(&lowered[pos + label.len()..]);
                if !value.is_empty() {
                    return Some(value);
                }
                if let Some(next) = lines.get(i + 1) {
                    let value = clean_item_line(next);
                    if !value.is_empty() {
                        return Some(value);
                    }
                }
            }
        }
    }

    let lowered = lines.join("\n").to_lowercase();
    INCOME_TYPE_KEYWORDS
        .iter()
        .filter_map(|k| lowered.find(k).map(|pos| (pos, *k)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, k)| k.to_string())
}

/// First description following an item header, or a `description:` value
fn line_item_phrase(lines: &[&str]) -> Option<String> {
    for (i, line) in lines.iter().enumerate() {
        let lowered = line.to_lowercase();
        let normalized = normalize_text(line);

        for label in ["description", "รายละเอียด", "รายการ"] {
            if let Some(pos) = lowered.find(label) {
                let rest = &lowered[pos + label.len()..];
                if rest.trim_start().starts_with(':') {
                    let value = labelled_value(rest);
                    if !value.is_empty() {
                        return Some(value);
                    }
                }
            }
        }

        let is_header = ITEM_HEADER_MARKERS
            .iter()
            .any(|m| contains_term(&normalized, m))
            && normalized.split(' ').count() <= 8;
        if is_header {
            let item = lines[i + 1..]
                .iter()
                .map(|l| clean_item_line(l))
                .find(|l| !l.is_empty() && !is_summary_line(l));
            if item.is_some() {
                return item;
            }
        }
    }
    None
}

fn is_content_line(line: &str) -> bool {
    let normalized = normalize_text(line);
    let letters = normalized.chars().filter(|c| c.is_alphabetic()).count();
    if letters < 3 || line.trim_end().ends_with(':') {
        return false;
    }
    !NON_CATEGORY_MARKERS
        .iter()
        .any(|m| contains_term(&normalized, m))
}

fn is_summary_line(line: &str) -> bool {
    let normalized = normalize_text(line);
    ["total", "subtotal", "vat", "รวม", "ภาษีมูลค่าเพิ่ม"]
        .iter()
        .any(|m| contains_term(&normalized, m))
}

/// Text after a `:` (or the whole remainder), cleaned
fn labelled_value(rest: &str) -> String {
    let value = rest.trim_start().trim_start_matches(&[':', '-'][..]).trim();
    clean_item_line(value)
}

/// Drop leading item numbers and trailing quantities/amounts
fn clean_item_line(line: &str) -> String {
    let words: Vec<&str> = line.split_whitespace().collect();
    let start = words
        .iter()
        .position(|w| !is_numeric_token(w))
        .unwrap_or(words.len());
    let end = words
        .iter()
        .rposition(|w| !is_numeric_token(w) && !is_currency_token(w))
        .map(|p| p + 1)
        .unwrap_or(start);

    if start >= end {
        return String::new();
    }
    words[start..end].join(" ")
}

fn is_numeric_token(token: &str) -> bool {
    token
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-' | ')' | '(' | '%' | '฿'))
}

fn is_currency_token(token: &str) -> bool {
    matches!(token.to_lowercase().as_str(), "thb" | "baht" | "บาท")
}

// ============================================================================
// Scoring
// ============================================================================

/// Score a category phrase against a template description (0-100)
pub fn score_phrase(category: &str, description: &str) -> (f64, String) {
    let nc = normalize_text(category);
    let nd = normalize_text(description);

    if nc.is_empty() || nd.is_empty() {
        return (0.0, "No category could be derived from the document".to_string());
    }

    if nc == nd {
        return (EXACT_SCORE, format!("Category '{}' equals template description", nc));
    }

    let shorter = if nc.chars().count() <= nd.chars().count() { &nc } else { &nd };
    // Whole-word containment only: "rent" must not match "parent"
    if shorter.chars().count() >= 3 && (contains_term(&nc, &nd) || contains_term(&nd, &nc)) {
        return (
            CONTAINMENT_SCORE,
            format!("Category '{}' and description '{}' contain each other", nc, nd),
        );
    }

    let concepts_c = concepts_of(&nc);
    let concepts_d = concepts_of(&nd);
    let tokens_c = tokens(&nc);
    let tokens_d = tokens(&nd);
    let jaccard = token_jaccard(&tokens_c, &tokens_d);

    if let Some(shared) = concepts_c.iter().find(|c| concepts_d.contains(c)) {
        let score = round2(SHARED_CONCEPT_BASE + SHARED_CONCEPT_BONUS * jaccard);
        return (score, format!("Category and description share concept '{}'", shared));
    }

    let unrelated = concepts_c.iter().any(|a| {
        concepts_d.iter().any(|b| {
            UNRELATED_CONCEPTS
                .iter()
                .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
        })
    });
    if unrelated {
        return (
            0.0,
            format!(
                "Concepts {:?} and {:?} belong to unrelated domains",
                concepts_c, concepts_d
            ),
        );
    }

    let lexical = (jaccard * 80.0).max(strsim::normalized_levenshtein(&nc, &nd) * 70.0);
    if !concepts_c.is_empty() && !concepts_d.is_empty() {
        let capped = round2(lexical.min(DISJOINT_CONCEPT_CAP));
        return (
            capped,
            format!("Disjoint concepts {:?} vs {:?}", concepts_c, concepts_d),
        );
    }

    (round2(lexical), "Lexical similarity only".to_string())
}

fn concepts_of(normalized: &str) -> Vec<&'static str> {
    CONCEPTS
        .iter()
        .filter(|(_, terms)| terms.iter().any(|t| contains_term(normalized, t)))
        .map(|(name, _)| *name)
        .collect()
}

// ============================================================================
// Issuer pre-check
// ============================================================================

/// Name variants for a template counterparty given as a name or party code
fn counterparty_names(counterparty: &str, parties: &[Party]) -> Vec<String> {
    match parties.iter().find(|p| p.code == counterparty) {
        Some(party) => party.names.clone(),
        None => vec![counterparty.to_string()],
    }
}

/// Locate a party in the document relative to the buyer/payer section
///
/// Lines before the first buyer marker form the issuer section. A line
/// carrying an issuer label counts as issuer wherever it appears.
pub fn locate_party(document_text: &str, names: &[String]) -> IssuerCheck {
    let needles: Vec<String> = names
        .iter()
        .map(|n| normalize_party_name(n))
        .filter(|n| n.chars().count() >= 2)
        .collect();
    if needles.is_empty() {
        return IssuerCheck::Absent;
    }

    let mut in_buyer_section = false;
    let mut seen_as_payer = false;

    for line in document_text.lines() {
        let normalized = normalize_text(line);
        if BUYER_MARKERS.iter().any(|m| contains_term(&normalized, m)) {
            in_buyer_section = true;
        }

        let party_line = normalize_party_name(line);
        let mentioned = needles.iter().any(|n| contains_term(&party_line, n));
        if !mentioned {
            continue;
        }

        let issuer_labelled = ISSUER_LABELS.iter().any(|m| contains_term(&normalized, m));
        if issuer_labelled || !in_buyer_section {
            return IssuerCheck::Issuer;
        }
        seen_as_payer = true;
    }

    if seen_as_payer {
        IssuerCheck::PayerOnly
    } else {
        IssuerCheck::Absent
    }
}
