//! Format and intent classifier.
//!
//! Rules only: weighted regex signals pick the format family, a second
//! pattern table scores business intent. The classifier never fails; the
//! worst case is `Unknown` with zero confidence.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::pipeline::types::{ClassificationResult, DocumentFormat, Intent};

/// A weighted format signal.
struct Signal {
    regex: Regex,
    weight: f64,
}

fn signal(pattern: &str, weight: f64) -> Signal {
    Signal {
        regex: Regex::new(pattern).expect("format signal pattern"),
        weight,
    }
}

static EMAIL_SIGNALS: LazyLock<Vec<Signal>> = LazyLock::new(|| {
    vec![
        // Header lines weigh more than salutations.
        signal(r"(?im)^from:\s*\S+", 2.0),
        signal(r"(?im)^to:\s*\S+", 2.0),
        signal(r"(?im)^subject:\s*\S+", 2.0),
        signal(r"(?im)^(cc|date):\s*\S+", 1.0),
        signal(r"(?i)\bdear\s+\w+", 1.0),
        signal(r"(?i)\bsincerely\b", 1.0),
        signal(r"(?i)\b(best|kind) regards\b", 1.0),
    ]
});

static PDF_SIGNALS: LazyLock<Vec<Signal>> = LazyLock::new(|| {
    vec![
        signal(r"%PDF-", 1.0),
        signal(r"(?i)\binvoice\s*(#|no\.?|number)?\s*:?\s*[A-Z0-9-]*\d", 1.0),
        signal(r"(?i)\btotal\s+amount\b", 1.0),
        signal(r"(?i)\bdue\s+date\b", 1.0),
        signal(r"(?i)\bsubtotal\b", 1.0),
        signal(r"(?i)\bbill\s+to\b", 1.0),
        signal(r"(?i)\bpolicy\s+document\b", 1.0),
        signal(r"(?i)\bregulation\s+\d+", 1.0),
        signal(r"(?i)\bcompliance\b", 1.0),
    ]
});

/// Intent patterns in tie-break order: earlier entries win equal scores.
static INTENT_PATTERNS: LazyLock<Vec<(Intent, Vec<Regex>)>> = LazyLock::new(|| {
    let table: [(Intent, &[&str]); 7] = [
        (
            Intent::FraudRisk,
            &[
                r"\bfraud",
                r"\bsuspicious\b",
                r"\bunauthori[sz]ed\b",
                r"\bbreach\b",
                r"\bphishing\b",
                r"\bscam\b",
                r"\bidentity theft\b",
                r"\banomal(y|ies)\b",
            ],
        ),
        (
            Intent::Complaint,
            &[
                r"\bcomplain(t|ts|ing)?\b",
                r"\bdissatisfied\b",
                r"\bangry\b",
                r"\bupset\b",
                r"\bdisappointed\b",
                r"\bterrible\b",
                r"\bawful\b",
                r"\brefund\b",
                r"\bescalate\b",
                r"\bunacceptable\b",
            ],
        ),
        (
            Intent::Rfq,
            &[
                r"\bquot(e|es|ation)\b",
                r"\bproposal\b",
                r"\bbid\b",
                r"\bpricing\b",
                r"\bcost estimate\b",
                r"\brequest for proposal\b",
                r"\brf[pq]\b",
            ],
        ),
        (
            Intent::Invoice,
            &[
                r"\binvoice\b",
                r"\bbill(ing)?\b",
                r"\bpayment\b",
                r"\bamount due\b",
                r"\btotal amount\b",
                r"\bsubtotal\b",
                r"\btax\b",
                r"\bdue date\b",
            ],
        ),
        (
            Intent::Regulation,
            &[
                r"\bregulat(ion|ions|ory)\b",
                r"\bcompliance\b",
                r"\bgdpr\b",
                r"\bhipaa\b",
                r"\bfda\b",
                r"\bpolicy\b",
                r"\blegal\b",
                r"\baudit\b",
            ],
        ),
        (
            Intent::TransactionData,
            &[
                r"\btransaction(_id)?\b",
                r"\border_id\b",
                r"\bevent_type\b",
                r#""amount"\s*:"#,
            ],
        ),
        (
            Intent::GeneralQuery,
            &[
                r"\bquestion\b",
                r"\binquiry\b",
                r"\bcould you\b",
                r"\bwondering\b",
                r"\bmore information\b",
            ],
        ),
    ];

    table
        .into_iter()
        .map(|(intent, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(&format!("(?i){p}")).expect("intent pattern"))
                .collect();
            (intent, compiled)
        })
        .collect()
});

static CURRENCY_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[$€£]\s?\d").expect("currency pattern"));

/// Rules-based format/intent classifier.
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify raw content, using `filename` as a fallback hint.
    pub fn classify(&self, content: &str, filename: Option<&str>) -> ClassificationResult {
        if content.trim().is_empty() {
            return ClassificationResult {
                format: DocumentFormat::Unknown,
                intent: Intent::Unknown,
                confidence: 0.0,
                format_confidence: 0.0,
                intent_confidence: 0.0,
                reasoning: "Format unknown: empty content. Intent unknown: empty content."
                    .to_string(),
            };
        }

        let (mut format, mut format_confidence, mut format_reason) = self.detect_format(content);

        if format == DocumentFormat::Unknown
            || format_confidence < self.config.low_confidence_threshold
        {
            if let Some((hinted, ext)) = filename.and_then(format_from_filename) {
                format_reason = format!(
                    "{format_reason}; overridden by filename extension .{ext} (content confidence {format_confidence:.2})"
                );
                format = hinted;
                format_confidence = self.config.filename_override_confidence;
            }
        }

        let (intent, intent_confidence, intent_reason) = self.detect_intent(content, format);

        let format_confidence = format_confidence.clamp(0.0, 1.0);
        let intent_confidence = intent_confidence.clamp(0.0, 1.0);
        let confidence = (format_confidence + intent_confidence) / 2.0;

        debug!(
            format = %format,
            intent = %intent,
            confidence,
            "Classified document"
        );

        ClassificationResult {
            format,
            intent,
            confidence,
            format_confidence,
            intent_confidence,
            reasoning: format!(
                "Format {format} (confidence {format_confidence:.2}): {format_reason}. \
                 Intent {intent} (confidence {intent_confidence:.2}): {intent_reason}."
            ),
        }
    }

    /// Metadata handed to downstream agents alongside the classification.
    pub fn routing_metadata(&self, result: &ClassificationResult) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("agent_name".into(), json!("classifier_agent"));
        meta.insert("format".into(), json!(result.format));
        meta.insert("intent".into(), json!(result.intent));
        meta.insert("confidence".into(), json!(result.confidence));
        meta.insert("reasoning".into(), json!(result.reasoning));
        meta.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
        meta.insert(
            "route_to_agent".into(),
            result
                .format
                .agent()
                .map(|a| json!(a.name()))
                .unwrap_or(Value::Null),
        );
        meta
    }

    /// Classification for a binary document whose text could not be
    /// extracted. The format is known from the upload; the intent is not.
    pub fn unreadable_document(&self, reason: &str) -> ClassificationResult {
        let format_confidence = self.config.filename_override_confidence;
        ClassificationResult {
            format: DocumentFormat::Pdf,
            intent: Intent::Unknown,
            confidence: format_confidence / 2.0,
            format_confidence,
            intent_confidence: 0.0,
            reasoning: format!(
                "Format pdf (confidence {format_confidence:.2}): binary document upload. \
                 Intent unknown: text extraction failed ({reason})."
            ),
        }
    }

    fn detect_format(&self, content: &str) -> (DocumentFormat, f64, String) {
        let trimmed = content.trim();
        let bracketed = (trimmed.starts_with('{') && trimmed.ends_with('}'))
            || (trimmed.starts_with('[') && trimmed.ends_with(']'));
        if bracketed {
            return match serde_json::from_str::<Value>(trimmed) {
                Ok(_) => (DocumentFormat::Json, 1.0, "content parsed as JSON".into()),
                Err(e) => (
                    DocumentFormat::Json,
                    0.7,
                    format!("bracket-shaped but not valid JSON ({e})"),
                ),
            };
        }

        let email = score(&EMAIL_SIGNALS, content);
        let pdf = score(&PDF_SIGNALS, content);
        let min = self.config.min_format_signal;

        // Ties go to email.
        let (format, best) = if email >= pdf {
            (DocumentFormat::Email, email)
        } else {
            (DocumentFormat::Pdf, pdf)
        };

        if best < min {
            return (
                DocumentFormat::Unknown,
                0.0,
                format!("no format signal cleared {min:.1} (email {email:.1}, pdf {pdf:.1})"),
            );
        }

        let confidence = (best / self.config.format_score_divisor).min(1.0);
        (
            format,
            confidence,
            format!("signal scores email {email:.1}, pdf {pdf:.1}"),
        )
    }

    fn detect_intent(&self, content: &str, format: DocumentFormat) -> (Intent, f64, String) {
        let mut best = (Intent::Unknown, 0usize);
        for (intent, patterns) in INTENT_PATTERNS.iter() {
            let hits = patterns.iter().filter(|r| r.is_match(content)).count();
            if hits > best.1 {
                best = (*intent, hits);
            }
        }

        let divisor = self.config.intent_score_divisor;
        if best.1 > 0 {
            let (intent, hits) = best;
            return (
                intent,
                (hits as f64 / divisor).min(1.0),
                format!("{hits} pattern hit(s)"),
            );
        }

        let nudged = match format {
            DocumentFormat::Json => Intent::TransactionData,
            DocumentFormat::Pdf if CURRENCY_AMOUNT.is_match(content) => Intent::Invoice,
            DocumentFormat::Pdf => Intent::Regulation,
            DocumentFormat::Email => Intent::GeneralQuery,
            DocumentFormat::Unknown => {
                return (Intent::Unknown, 0.0, "no pattern matched".into());
            }
        };
        (
            nudged,
            (1.0 / divisor).min(1.0),
            format!("no pattern matched, defaulted for {format}"),
        )
    }
}

fn score(signals: &[Signal], content: &str) -> f64 {
    signals
        .iter()
        .filter(|s| s.regex.is_match(content))
        .map(|s| s.weight)
        .sum()
}

fn format_from_filename(filename: &str) -> Option<(DocumentFormat, String)> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    let format = match ext.as_str() {
        "json" => DocumentFormat::Json,
        "eml" | "msg" => DocumentFormat::Email,
        "pdf" | "txt" => DocumentFormat::Pdf,
        _ => return None,
    };
    Some((format, ext))
}
