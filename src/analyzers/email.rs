//! Email analyzer.
//!
//! Pulls headers and body out of free-text email, then scores tone, urgency
//! and sentiment with fixed keyword tables. The action table at the end is
//! first-match-wins.

use std::collections::HashMap;
use std::sync::LazyLock;

use mail_parser::MessageParser;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::analyzers::Analyzer;
use crate::config::EmailRules;
use crate::pipeline::types::{
    AgentKind, AnalysisResult, Finding, FindingKind, Severity, SuggestedAction, clamp_unit,
};

const DEFAULT_SENDER: &str = "unknown@example.com";
const DEFAULT_RECIPIENT: &str = "support@company.com";
const DEFAULT_SUBJECT: &str = "No Subject";
const BODY_PREVIEW_CHARS: usize = 200;

// ── Tone / urgency ──────────────────────────────────────────────────

/// Email tone, declared from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Threatening,
    Angry,
    /// Escalation language about a problem ("urgent problem", "asap").
    UrgentNegative,
    /// Urgency around an opportunity.
    UrgentPositive,
    Polite,
    Neutral,
}

impl Tone {
    /// Severity order used for the tie-break.
    pub const BY_SEVERITY: [Tone; 6] = [
        Tone::Threatening,
        Tone::Angry,
        Tone::UrgentNegative,
        Tone::UrgentPositive,
        Tone::Polite,
        Tone::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threatening => "threatening",
            Self::Angry => "angry",
            Self::UrgentNegative => "urgent_negative",
            Self::UrgentPositive => "urgent_positive",
            Self::Polite => "polite",
            Self::Neutral => "neutral",
        }
    }

    fn risk_weight(&self) -> f64 {
        match self {
            Self::Threatening => 0.9,
            Self::Angry => 0.7,
            Self::UrgentNegative => 0.6,
            Self::UrgentPositive => 0.3,
            Self::Neutral => 0.2,
            Self::Polite => 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    fn risk_weight(&self) -> f64 {
        match self {
            Self::Critical => 0.9,
            Self::High => 0.6,
            Self::Medium => 0.3,
            Self::Low => 0.1,
        }
    }
}

// ── Keyword tables ──────────────────────────────────────────────────

fn ci(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("email keyword pattern")
}

static TONE_PATTERNS: LazyLock<Vec<(Tone, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Tone::Threatening,
            ci(r"\b(legal action|lawyers?|attorneys?|sue|suing|lawsuit|court|police|action will be taken)\b"),
        ),
        (
            Tone::Angry,
            ci(r"\b(furious|angry|terrible|awful|unacceptable|outrageous|worst|disgusted|disgusting|ridiculous)\b"),
        ),
        (
            Tone::UrgentNegative,
            ci(r"\b(urgent problem|critical issue|immediate attention|asap|escalate|escalation|system down)\b"),
        ),
        (
            Tone::UrgentPositive,
            ci(r"\b(urgent opportunity|time[- ]sensitive offer|limited time|act fast|exclusive offer)\b"),
        ),
        (
            Tone::Polite,
            ci(r"\b(please|thank you|thanks|kindly|appreciate|grateful)\b"),
        ),
    ]
});

static URGENCY_PATTERNS: LazyLock<Vec<(Urgency, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Urgency::Critical,
            ci(r"\b(urgent|emergency|critical|immediately|asap|right now)\b"),
        ),
        (
            Urgency::High,
            ci(r"\b(important|promptly|soon|needs attention|high priority|today)\b"),
        ),
        (
            Urgency::Medium,
            ci(r"\b(reminder|follow[- ]up|update|when possible)\b"),
        ),
        (
            Urgency::Low,
            ci(r"\b(no rush|whenever|at your convenience|fyi|low priority)\b"),
        ),
    ]
});

static DEADLINE: LazyLock<Regex> =
    LazyLock::new(|| ci(r"\b(deadline|due (by|on|today|tomorrow)|expir(e|es|ed|ing|ation)|by end of day|eod)\b"));

static LITERAL_URGENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bURGENT\b").expect("literal urgent pattern"));

static POSITIVE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    ci(r"\b(good|great|excellent|happy|satisfied|pleased|wonderful|thanks|appreciate|love)\b")
});

static NEGATIVE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    ci(r"\b(bad|poor|terrible|awful|sad|angry|unhappy|issue|problem|complaint|concern|error|broken|damaged|worst|unacceptable)\b")
});

static KEYWORD_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]{3,15}\b").expect("keyword token pattern"));

static STOP_WORDS: &[&str] = &[
    "the", "and", "for", "you", "your", "with", "this", "that", "are", "was", "were", "have",
    "has", "had", "not", "but", "from", "our", "they", "them", "their", "will", "would",
    "can", "could", "should", "been", "being", "all", "any", "about", "into", "than", "then",
    "there", "here", "what", "when", "which", "who", "how", "also", "just", "very", "its",
    "out", "did", "does", "get", "got", "per", "may", "yours", "dear", "regards",
];

fn header_regex(name: &str) -> Regex {
    Regex::new(&format!(r"(?im)^{name}:[ \t]*(.+)$")).expect("header pattern")
}

static FROM_HEADER: LazyLock<Regex> = LazyLock::new(|| header_regex("from"));
static TO_HEADER: LazyLock<Regex> = LazyLock::new(|| header_regex("to"));
static SUBJECT_HEADER: LazyLock<Regex> = LazyLock::new(|| header_regex("subject"));
static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]*:[ \t]").expect("header line pattern"));

// ── Analysis ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Headers {
    sender: String,
    recipient: String,
    subject: String,
    body: String,
    parsed_as_message: bool,
}

/// Email content analyzer.
pub struct EmailAnalyzer {
    rules: EmailRules,
}

impl EmailAnalyzer {
    pub fn new(rules: EmailRules) -> Self {
        Self { rules }
    }

    fn extract(&self, content: &str) -> Headers {
        let head: String = content
            .lines()
            .take(self.rules.header_scan_lines)
            .collect::<Vec<_>>()
            .join("\n");
        let scan = |re: &Regex| {
            re.captures(&head)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let mut sender = scan(&FROM_HEADER);
        let mut recipient = scan(&TO_HEADER);
        let mut subject = scan(&SUBJECT_HEADER);
        let mut body = None;
        let mut parsed_as_message = false;

        if looks_like_message(content) {
            if let Some(parsed) = MessageParser::default().parse(content.as_bytes()) {
                parsed_as_message = true;
                if let Some(addr) = parsed
                    .from()
                    .and_then(|a| a.first())
                    .and_then(|a| a.address())
                {
                    sender = Some(addr.to_string());
                }
                if let Some(addr) = parsed
                    .to()
                    .and_then(|a| a.first())
                    .and_then(|a| a.address())
                {
                    recipient = Some(addr.to_string());
                }
                if let Some(s) = parsed.subject().filter(|s| !s.trim().is_empty()) {
                    subject = Some(s.trim().to_string());
                }
                body = parsed
                    .body_text(0)
                    .map(|b| b.trim().to_string())
                    .filter(|b| !b.is_empty());
            }
        }

        Headers {
            sender: sender.unwrap_or_else(|| DEFAULT_SENDER.to_string()),
            recipient: recipient.unwrap_or_else(|| DEFAULT_RECIPIENT.to_string()),
            subject: subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            body: body.unwrap_or_else(|| extract_body(content)),
            parsed_as_message,
        }
    }

    /// Top-K tokens by frequency after stop-word removal; ties keep first
    /// occurrence order.
    pub fn keywords(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (idx, m) in KEYWORD_TOKEN.find_iter(&lower).enumerate() {
            let word = m.as_str();
            if STOP_WORDS.contains(&word) {
                continue;
            }
            counts.entry(word).or_insert((0, idx)).0 += 1;
        }
        let mut ranked: Vec<(&str, usize, usize)> =
            counts.into_iter().map(|(w, (n, first))| (w, n, first)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked
            .into_iter()
            .take(self.rules.keyword_limit)
            .map(|(w, _, _)| w.to_string())
            .collect()
    }

    /// Most severe tone with a nonzero score, plus the raw scores.
    pub fn tone(&self, text: &str) -> (Tone, HashMap<Tone, usize>) {
        let mut scores: HashMap<Tone, usize> = HashMap::new();
        for (tone, re) in TONE_PATTERNS.iter() {
            let hits = re.find_iter(text).count();
            if hits > 0 {
                *scores.entry(*tone).or_default() += hits;
            }
        }
        if self.is_shouting(text) {
            *scores.entry(Tone::Angry).or_default() += 1;
        }
        if text.matches('!').count() > self.rules.exclamation_threshold {
            *scores.entry(Tone::Angry).or_default() += 1;
        }

        let tone = Tone::BY_SEVERITY
            .into_iter()
            .find(|t| scores.get(t).copied().unwrap_or(0) > 0)
            .unwrap_or(Tone::Neutral);
        (tone, scores)
    }

    /// Highest-scoring urgency level; ties go to the more severe level and
    /// no signal at all means `Medium`.
    pub fn urgency(&self, text: &str) -> Urgency {
        let mut scores: HashMap<Urgency, usize> = HashMap::new();
        for (level, re) in URGENCY_PATTERNS.iter() {
            let hits = re.find_iter(text).count();
            if hits > 0 {
                *scores.entry(*level).or_default() += hits;
            }
        }
        if DEADLINE.is_match(text) {
            *scores.entry(Urgency::High).or_default() += 2;
        }
        if LITERAL_URGENT.is_match(text) {
            *scores.entry(Urgency::Critical).or_default() += 2;
        }
        if text.contains("!!!") {
            *scores.entry(Urgency::Critical).or_default() += 1;
        }

        [Urgency::Critical, Urgency::High, Urgency::Medium, Urgency::Low]
            .into_iter()
            .filter_map(|u| scores.get(&u).map(|n| (u, *n)))
            .filter(|(_, n)| *n > 0)
            .fold(None, |best: Option<(Urgency, usize)>, (u, n)| match best {
                Some((_, bn)) if bn >= n => best,
                _ => Some((u, n)),
            })
            .map(|(u, _)| u)
            .unwrap_or(Urgency::Medium)
    }

    /// (positive − negative) / max(sqrt(word count), 1), clamped to [-1, 1].
    pub fn sentiment(&self, text: &str) -> f64 {
        let positive = POSITIVE_WORDS.find_iter(text).count() as f64;
        let negative = NEGATIVE_WORDS.find_iter(text).count() as f64;
        if positive == 0.0 && negative == 0.0 {
            return 0.0;
        }
        let words = text.split_whitespace().count() as f64;
        ((positive - negative) / words.sqrt().max(1.0)).clamp(-1.0, 1.0)
    }

    fn is_shouting(&self, text: &str) -> bool {
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        if letters < self.rules.min_shouting_letters {
            return false;
        }
        uppercase_ratio(text) > self.rules.shouting_ratio
    }
}

/// First-match-wins action table.
pub fn decide_action(tone: Tone, urgency: Urgency, sentiment: f64) -> SuggestedAction {
    match (tone, urgency) {
        (Tone::Threatening | Tone::UrgentNegative, _) => SuggestedAction::EscalateToManager,
        (Tone::Angry, Urgency::High | Urgency::Critical) => SuggestedAction::EscalateToCrm,
        (_, Urgency::Critical) => SuggestedAction::EmergencyResponse,
        (_, Urgency::High) if sentiment < -0.5 => SuggestedAction::PriorityResponse,
        (Tone::Polite, Urgency::Low) => SuggestedAction::LogAndAcknowledge,
        _ => SuggestedAction::StandardResponse,
    }
}

fn requires_escalation(action: SuggestedAction) -> bool {
    matches!(
        action,
        SuggestedAction::EscalateToManager
            | SuggestedAction::EscalateToCrm
            | SuggestedAction::EmergencyResponse
            | SuggestedAction::PriorityResponse
    )
}

impl Analyzer for EmailAnalyzer {
    fn kind(&self) -> AgentKind {
        AgentKind::Email
    }

    fn analyze(&self, content: &str) -> AnalysisResult {
        let headers = self.extract(content);
        let text = format!("{} {}", headers.subject, headers.body);

        let keywords = self.keywords(&text);
        let (tone, tone_scores) = self.tone(&text);
        let urgency = self.urgency(&text);
        let sentiment = self.sentiment(&text);
        let action = decide_action(tone, urgency, sentiment);
        let escalate = requires_escalation(action);
        let shouting = self.is_shouting(&text);

        let mut findings = Vec::new();
        match tone {
            Tone::Threatening => findings.push(Finding::new(
                FindingKind::HostileTone,
                Severity::High,
                "threatening language detected",
            )),
            Tone::Angry => findings.push(Finding::new(
                FindingKind::HostileTone,
                Severity::Medium,
                "angry tone detected",
            )),
            Tone::UrgentNegative => findings.push(Finding::new(
                FindingKind::EscalationLanguage,
                Severity::Medium,
                "escalation language detected",
            )),
            _ => {}
        }
        if shouting {
            findings.push(Finding::new(
                FindingKind::Shouting,
                Severity::Low,
                format!("uppercase ratio {:.2}", uppercase_ratio(&text)),
            ));
        }
        match urgency {
            Urgency::Critical => findings.push(Finding::new(
                FindingKind::HighUrgency,
                Severity::High,
                "critical urgency",
            )),
            Urgency::High => findings.push(Finding::new(
                FindingKind::HighUrgency,
                Severity::Medium,
                "high urgency",
            )),
            _ => {}
        }
        if sentiment < -0.5 {
            findings.push(Finding::new(
                FindingKind::NegativeSentiment,
                Severity::Medium,
                format!("sentiment {sentiment:.2}"),
            ));
        }

        let risk = clamp_unit(
            0.5 * tone.risk_weight() + 0.3 * urgency.risk_weight() + 0.2 * (-sentiment).max(0.0),
        );

        let mut preview: String = headers.body.chars().take(BODY_PREVIEW_CHARS).collect();
        if headers.body.chars().count() > BODY_PREVIEW_CHARS {
            preview.push_str("...");
        }

        let mut fields = Map::new();
        fields.insert("sender".into(), json!(headers.sender));
        fields.insert("recipient".into(), json!(headers.recipient));
        fields.insert("subject".into(), json!(headers.subject));
        fields.insert("body_preview".into(), json!(preview));
        fields.insert("keywords".into(), json!(keywords));
        fields.insert("tone".into(), json!(tone));
        fields.insert("urgency".into(), json!(urgency));
        fields.insert("sentiment_score".into(), json!(sentiment));
        fields.insert("requires_escalation".into(), json!(escalate));

        let mut tone_map = Map::new();
        for t in Tone::BY_SEVERITY {
            if let Some(n) = tone_scores.get(&t) {
                tone_map.insert(t.as_str().into(), json!(n));
            }
        }
        let mut metadata = Map::new();
        metadata.insert(
            "word_count".into(),
            json!(headers.body.split_whitespace().count()),
        );
        metadata.insert("uppercase_ratio".into(), json!(uppercase_ratio(&text)));
        metadata.insert("exclamation_count".into(), json!(text.matches('!').count()));
        metadata.insert("tone_scores".into(), Value::Object(tone_map));
        metadata.insert("parsed_as_message".into(), json!(headers.parsed_as_message));

        debug!(
            tone = tone.as_str(),
            urgency = urgency.as_str(),
            sentiment,
            action = %action,
            "Email analyzed"
        );

        AnalysisResult::new(AgentKind::Email, fields, findings, risk, action)
            .with_escalation(escalate)
            .with_metadata(metadata)
    }
}

/// Content whose first line is a header and which has a header/body break.
fn looks_like_message(content: &str) -> bool {
    let first = content.lines().find(|l| !l.trim().is_empty());
    first.is_some_and(|l| HEADER_LINE.is_match(l))
        && (content.contains("\n\n") || content.contains("\r\n\r\n"))
}

/// Content after the first blank line, or the content with header-shaped
/// lines stripped.
fn extract_body(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    if let Some((_, rest)) = normalized.split_once("\n\n") {
        let rest = rest.trim();
        if !rest.is_empty() {
            return rest.to_string();
        }
    }
    normalized
        .lines()
        .filter(|l| !HEADER_LINE.is_match(l))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Share of alphabetic characters that are uppercase.
fn uppercase_ratio(text: &str) -> f64 {
    let (upper, letters) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(u, n), c| {
            (u + usize::from(c.is_uppercase()), n + 1)
        });
    if letters == 0 {
        0.0
    } else {
        upper as f64 / letters as f64
    }
}

#[cfg(test)]
#[path = "email_tests.rs"]
mod tests;
