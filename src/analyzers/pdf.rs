//! PDF-text analyzer.
//!
//! Works on already-extracted text. Detects the document type, pulls named
//! fields with a fixed regex table, scans for compliance terms and raises
//! amount/regulatory flags.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::analyzers::Analyzer;
use crate::config::PdfRules;
use crate::error::ExtractionError;
use crate::pipeline::types::{
    AgentKind, AnalysisResult, Finding, FindingKind, Severity, SuggestedAction, count_high,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Policy,
    Contract,
    Regulation,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Policy => "policy",
            Self::Contract => "contract",
            Self::Regulation => "regulation",
            Self::Unknown => "unknown",
        }
    }
}

fn ci(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("pdf pattern")
}

const NUMBER: &str = r"(\d[\d,]*(?:\.\d+)?)";
const DATE: &str = r"(\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}-\d{2}-\d{2}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4})";

/// Keyword families in tie-break order.
static TYPE_PATTERNS: LazyLock<Vec<(DocumentType, Vec<Regex>)>> = LazyLock::new(|| {
    let table: [(DocumentType, &[&str]); 4] = [
        (
            DocumentType::Invoice,
            &[
                r"invoice\s*#?\s*\d+",
                r"bill\s+to",
                r"total\s+amount",
                r"due\s+date",
                r"subtotal",
                r"tax\s+amount",
                r"payment\s+terms",
            ],
        ),
        (
            DocumentType::Policy,
            &[
                r"policy\s+document",
                r"terms\s+and\s+conditions",
                r"privacy\s+policy",
                r"data\s+protection",
                r"user\s+agreement",
                r"service\s+agreement",
            ],
        ),
        (
            DocumentType::Contract,
            &[
                r"contract\s+agreement",
                r"party\s+of\s+the\s+first\s+part",
                r"whereas",
                r"signature\s+date",
                r"terms\s+of\s+agreement",
                r"effective\s+date",
            ],
        ),
        (
            DocumentType::Regulation,
            &[
                r"regulation\s+\d+",
                r"compliance\s+requirements",
                r"regulatory\s+framework",
                r"legal\s+obligations",
                r"statutory\s+requirements",
            ],
        ),
    ];
    table
        .into_iter()
        .map(|(t, patterns)| (t, patterns.iter().map(|p| ci(p)).collect()))
        .collect()
});

/// Named extraction patterns, applied once each in this order.
static FIELD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("invoice_number", ci(r"invoice\s*(?:#|no\.?|number)?\s*:?\s*([A-Z]*-?\d[A-Z0-9-]*)")),
        ("invoice_date", ci(&format!(r"(?:invoice\s+)?date\s*:?\s*{DATE}"))),
        ("due_date", ci(&format!(r"due\s+date\s*:?\s*{DATE}"))),
        ("total_amount", ci(&format!(r"\btotal(?:\s+amount)?(?:\s+due)?\s*:?\s*\$?\s*{NUMBER}"))),
        ("subtotal", ci(&format!(r"\bsubtotal\s*:?\s*\$?\s*{NUMBER}"))),
        ("tax_amount", ci(&format!(r"\btax(?:\s+amount)?\s*:?\s*\$?\s*{NUMBER}"))),
        ("email", ci(r"([a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,})")),
        ("phone", ci(r"(\(?\d{3}\)?[-.\s]?\d{3}[-.\s]\d{4})")),
        ("amount", ci(&format!(r"\$\s*{NUMBER}"))),
        ("percentage", ci(r"(\d+(?:\.\d+)?)\s*%")),
        ("effective_date", ci(&format!(r"effective\s+date\s*:?\s*{DATE}"))),
        ("expiration_date", ci(&format!(r"expir(?:ation|y)\s+date\s*:?\s*{DATE}"))),
    ]
});

/// Fields parsed as numbers when they look numeric.
const NUMERIC_FIELDS: &[&str] = &["total_amount", "subtotal", "tax_amount", "amount", "percentage"];

static COMPLIANCE_TERMS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        "gdpr",
        "general data protection regulation",
        "fda",
        "food and drug administration",
        "sox",
        "sarbanes-oxley",
        "hipaa",
        "health insurance portability",
        "pci dss",
        "ccpa",
        "california consumer privacy act",
        "ferpa",
        "glba",
        "iso 27001",
        "compliance",
        "regulatory",
        "audit",
        "data protection",
        "privacy policy",
        "information security",
        "risk management",
    ]
    .into_iter()
    .map(|term| (term, ci(&format!(r"\b{}\b", regex::escape(term)))))
    .collect()
});

const CRITICAL_TERMS: &[&str] = &["gdpr", "fda", "hipaa", "sox"];

static LINE_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(.+?)\s+(\d+)\s+\$?{NUMBER}\s+\$?{NUMBER}\s*$")).expect("line item pattern")
});
static SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d+\.?\s+[A-Z][^.\n]+)").expect("section pattern"));
static RETENTION: LazyLock<Regex> =
    LazyLock::new(|| ci(r"retain\w*\b.*?(\d+)\s+(days?|months?|years?)"));
static TABLE_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|\s*\w+\s*\|").expect("table pattern"));
static SIGNATURE: LazyLock<Regex> =
    LazyLock::new(|| ci(r"signature|signed|_{5,}"));

/// PDF-text analyzer.
pub struct PdfAnalyzer {
    rules: PdfRules,
}

impl PdfAnalyzer {
    pub fn new(rules: PdfRules) -> Self {
        Self { rules }
    }

    /// Best-scoring document type and its confidence; `Unknown` when no
    /// family matched.
    pub fn detect_type(&self, text: &str) -> (DocumentType, f64) {
        let mut best = (DocumentType::Unknown, 0.0);
        for (doc_type, patterns) in TYPE_PATTERNS.iter() {
            let hits: usize = patterns.iter().map(|r| r.find_iter(text).count()).sum();
            let score = hits as f64 / patterns.len() as f64;
            if score > best.1 {
                best = (*doc_type, score);
            }
        }
        (best.0, best.1.min(1.0))
    }

    /// Named fields plus document-type extras, in extraction order.
    pub fn extract_fields(&self, text: &str, doc_type: DocumentType) -> Map<String, Value> {
        let mut data = Map::new();
        for (name, re) in FIELD_PATTERNS.iter() {
            let Some(raw) = re.captures(text).and_then(|c| c.get(1)) else {
                continue;
            };
            let raw = raw.as_str().trim();
            let value = if NUMERIC_FIELDS.contains(name) {
                parse_number(raw)
                    .map(|n| json!(n))
                    .unwrap_or_else(|| json!(raw))
            } else {
                json!(raw)
            };
            data.insert((*name).to_string(), value);
        }

        match doc_type {
            DocumentType::Invoice => {
                let items: Vec<Value> = text
                    .lines()
                    .filter_map(|line| LINE_ITEM.captures(line.trim()))
                    .filter_map(|c| {
                        Some(json!({
                            "description": c.get(1)?.as_str().trim(),
                            "quantity": c.get(2)?.as_str().parse::<u64>().ok()?,
                            "unit_price": parse_number(c.get(3)?.as_str())?,
                            "total": parse_number(c.get(4)?.as_str())?,
                        }))
                    })
                    .collect();
                data.insert("line_item_count".into(), json!(items.len()));
                data.insert("line_items".into(), Value::Array(items));
            }
            DocumentType::Policy => {
                let sections: Vec<&str> = SECTION
                    .captures_iter(text)
                    .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
                    .take(10)
                    .collect();
                data.insert("sections".into(), json!(sections));
                let retention: Vec<String> = RETENTION
                    .captures_iter(text)
                    .filter_map(|c| Some(format!("{} {}", c.get(1)?.as_str(), c.get(2)?.as_str())))
                    .collect();
                if !retention.is_empty() {
                    data.insert("retention_periods".into(), json!(retention));
                }
            }
            _ => {}
        }
        data
    }

    /// Compliance terms present in the text, in table order.
    pub fn compliance_keywords(&self, text: &str) -> Vec<&'static str> {
        COMPLIANCE_TERMS
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(term, _)| *term)
            .collect()
    }

    fn flag_risks(&self, data: &Map<String, Value>, keywords: &[&str]) -> Vec<Finding> {
        let mut flags = Vec::new();

        if let Some(total) = data.get("total_amount").and_then(Value::as_f64) {
            if total > self.rules.max_invoice_amount {
                flags.push(
                    Finding::new(
                        FindingKind::HighAmount,
                        Severity::High,
                        format!(
                            "total amount {total:.2} exceeds {:.2}",
                            self.rules.max_invoice_amount
                        ),
                    )
                    .on_field("total_amount"),
                );
            }
        }

        for keyword in keywords.iter().filter(|k| CRITICAL_TERMS.contains(*k)) {
            flags.push(
                Finding::new(
                    FindingKind::RegulatoryMention,
                    Severity::Medium,
                    format!("mentions {}", keyword.to_uppercase()),
                )
                .on_field("compliance_keywords"),
            );
        }

        for (name, value) in data {
            if !name.ends_with("_amount") {
                continue;
            }
            let Some(amount) = value.as_f64() else {
                continue;
            };
            if self
                .rules
                .suspicious_amounts
                .iter()
                .any(|s| (s - amount).abs() < 1e-9)
            {
                flags.push(
                    Finding::new(
                        FindingKind::SuspiciousAmount,
                        Severity::Medium,
                        format!("{name} {amount} matches a known test amount"),
                    )
                    .on_field(name.as_str()),
                );
            }
        }
        flags
    }

    fn multiplier(&self, doc_type: DocumentType) -> f64 {
        match doc_type {
            DocumentType::Invoice => self.rules.invoice_multiplier,
            DocumentType::Policy => self.rules.policy_multiplier,
            DocumentType::Contract => self.rules.contract_multiplier,
            DocumentType::Regulation => self.rules.regulation_multiplier,
            DocumentType::Unknown => self.rules.unknown_multiplier,
        }
    }

    /// Sum of flag weights times the type multiplier, over the flag count.
    pub fn risk_score(&self, flags: &[Finding], doc_type: DocumentType) -> f64 {
        if flags.is_empty() {
            return 0.0;
        }
        let total: f64 = flags.iter().map(|f| f.severity.weight()).sum();
        (total * self.multiplier(doc_type) / flags.len() as f64).min(1.0)
    }

    fn decide_action(&self, risk: f64, high: usize) -> SuggestedAction {
        if risk >= 0.8 || high >= 2 {
            SuggestedAction::EscalateComplianceReview
        } else if risk >= 0.6 || high >= 1 {
            SuggestedAction::FlagForManualReview
        } else if risk >= 0.3 {
            SuggestedAction::LogForAudit
        } else {
            SuggestedAction::ProcessNormally
        }
    }

    /// Result for a document whose text could not be extracted.
    pub fn extraction_failed(&self, error: &ExtractionError) -> AnalysisResult {
        let mut fields = Map::new();
        fields.insert("document_type".into(), json!(DocumentType::Unknown));
        fields.insert("error".into(), json!(error.to_string()));
        AnalysisResult::new(
            AgentKind::Pdf,
            fields,
            vec![Finding::new(
                FindingKind::ProcessingError,
                Severity::Critical,
                format!("text extraction failed: {error}"),
            )],
            1.0,
            SuggestedAction::ManualReviewRequired,
        )
    }

    fn metadata(&self, text: &str, data: &Map<String, Value>, confidence: f64) -> Map<String, Value> {
        let line_count = text.lines().count();
        let mut meta = Map::new();
        meta.insert("character_count".into(), json!(text.chars().count()));
        meta.insert("word_count".into(), json!(text.split_whitespace().count()));
        meta.insert("line_count".into(), json!(line_count));
        meta.insert("page_count_estimate".into(), json!((line_count / 50).max(1)));
        meta.insert("has_tables".into(), json!(TABLE_ROW.is_match(text)));
        meta.insert("has_signatures".into(), json!(SIGNATURE.is_match(text)));
        meta.insert(
            "contains_amounts".into(),
            json!(data.keys().filter(|k| k.contains("amount")).count()),
        );
        meta.insert(
            "contains_dates".into(),
            json!(data.keys().filter(|k| k.contains("date")).count()),
        );
        meta.insert("document_type_confidence".into(), json!(confidence));
        meta
    }
}

impl Analyzer for PdfAnalyzer {
    fn kind(&self) -> AgentKind {
        AgentKind::Pdf
    }

    fn analyze(&self, text: &str) -> AnalysisResult {
        let (doc_type, confidence) = self.detect_type(text);
        let data = self.extract_fields(text, doc_type);
        let keywords = self.compliance_keywords(text);
        let flags = self.flag_risks(&data, &keywords);
        let risk = self.risk_score(&flags, doc_type);
        let action = self.decide_action(risk, count_high(&flags));
        let metadata = self.metadata(text, &data, confidence);

        debug!(
            document_type = doc_type.as_str(),
            flags = flags.len(),
            risk,
            action = %action,
            "PDF text analyzed"
        );

        let mut fields = Map::new();
        fields.insert("document_type".into(), json!(doc_type));
        fields.insert("document_type_confidence".into(), json!(confidence));
        fields.extend(data);
        fields.insert("compliance_keywords".into(), json!(keywords));
        fields.insert(
            "text_preview".into(),
            json!(text.chars().take(self.rules.text_preview_chars).collect::<String>()),
        );

        AnalysisResult::new(AgentKind::Pdf, fields, flags, risk, action).with_metadata(metadata)
    }
}

/// Parse a number with thousands separators stripped.
fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}
