//! Shared types for the document pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Input ───────────────────────────────────────────────────────────

/// One inbound document as handed over by the input source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    /// Raw (already decoded) content.
    pub content: String,
    /// Original filename, used as a format hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl DocumentInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Syntactic shape of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Email,
    Json,
    Pdf,
    Unknown,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Unknown => "unknown",
        }
    }

    /// The analyzer responsible for this format, if any.
    pub fn agent(&self) -> Option<AgentKind> {
        match self {
            Self::Email => Some(AgentKind::Email),
            Self::Json => Some(AgentKind::Json),
            Self::Pdf => Some(AgentKind::Pdf),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred business purpose of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Rfq,
    Complaint,
    Invoice,
    Regulation,
    FraudRisk,
    TransactionData,
    GeneralQuery,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rfq => "rfq",
            Self::Complaint => "complaint",
            Self::Invoice => "invoice",
            Self::Regulation => "regulation",
            Self::FraudRisk => "fraud_risk",
            Self::TransactionData => "transaction_data",
            Self::GeneralQuery => "general_query",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the classifier. Produced once per input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub format: DocumentFormat,
    pub intent: Intent,
    /// Average of the two sub-confidences, in [0, 1].
    pub confidence: f64,
    pub format_confidence: f64,
    pub intent_confidence: f64,
    /// Audit trail of both sub-decisions. Not parsed downstream.
    pub reasoning: String,
}

// ── Findings ────────────────────────────────────────────────────────

/// Severity of a finding, with its risk weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Low => 0.1,
            Self::Medium => 0.3,
            Self::High => 0.6,
            Self::Critical => 1.0,
        }
    }
}

/// Tag of an analyzer finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    // JSON
    InvalidJson,
    UnknownSchema,
    UnexpectedStructure,
    FieldMissing,
    TypeMismatch,
    ValueOutOfRange,
    SuspiciousPattern,
    FieldTooLong,
    UnexpectedValue,
    // PDF
    HighAmount,
    RegulatoryMention,
    SuspiciousAmount,
    ProcessingError,
    // Email
    HostileTone,
    EscalationLanguage,
    HighUrgency,
    NegativeSentiment,
    Shouting,
}

/// A tagged, severity-rated analyzer finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    /// Field the finding refers to, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Finding {
    pub fn new(kind: FindingKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            field: None,
            message: message.into(),
        }
    }

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

// ── Analysis ────────────────────────────────────────────────────────

/// Which analyzer produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "email_agent")]
    Email,
    #[serde(rename = "json_agent")]
    Json,
    #[serde(rename = "pdf_agent")]
    Pdf,
}

impl AgentKind {
    /// Source-agent identity recorded in traces and action requests.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Email => "email_agent",
            Self::Json => "json_agent",
            Self::Pdf => "pdf_agent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "email_agent" => Some(Self::Email),
            "json_agent" => Some(Self::Json),
            "pdf_agent" => Some(Self::Pdf),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Suggested follow-up, drawn from the analyzers' fixed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestedAction {
    // Email
    EscalateToManager,
    EscalateToCrm,
    EmergencyResponse,
    PriorityResponse,
    LogAndAcknowledge,
    StandardResponse,
    // JSON
    BlockAndAlert,
    FlagForReview,
    LogWarning,
    // PDF
    EscalateComplianceReview,
    FlagForManualReview,
    LogForAudit,
    ManualReviewRequired,
    // Shared
    ProcessNormally,
}

impl SuggestedAction {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::EscalateToManager => "escalate-to-manager",
            Self::EscalateToCrm => "escalate-to-crm",
            Self::EmergencyResponse => "emergency-response",
            Self::PriorityResponse => "priority-response",
            Self::LogAndAcknowledge => "log-and-acknowledge",
            Self::StandardResponse => "standard-response",
            Self::BlockAndAlert => "block-and-alert",
            Self::FlagForReview => "flag-for-review",
            Self::LogWarning => "log-warning",
            Self::EscalateComplianceReview => "escalate-compliance-review",
            Self::FlagForManualReview => "flag-for-manual-review",
            Self::LogForAudit => "log-for-audit",
            Self::ManualReviewRequired => "manual-review-required",
            Self::ProcessNormally => "process-normally",
        }
    }
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Uniform analyzer output. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub agent: AgentKind,
    /// Extracted fields, in extraction order.
    pub extracted_fields: Map<String, Value>,
    pub findings: Vec<Finding>,
    /// Aggregate risk in [0, 1].
    pub risk_score: f64,
    pub suggested_action: SuggestedAction,
    /// Set by analyzers that explicitly ask for escalation.
    pub requires_escalation: bool,
    /// Auxiliary data: counts, previews.
    pub metadata: Map<String, Value>,
}

impl AnalysisResult {
    /// Build a result, clamping the risk score into [0, 1].
    pub fn new(
        agent: AgentKind,
        extracted_fields: Map<String, Value>,
        findings: Vec<Finding>,
        risk_score: f64,
        suggested_action: SuggestedAction,
    ) -> Self {
        Self {
            agent,
            extracted_fields,
            findings,
            risk_score: clamp_unit(risk_score),
            suggested_action,
            requires_escalation: false,
            metadata: Map::new(),
        }
    }

    pub fn with_escalation(mut self, requires_escalation: bool) -> Self {
        self.requires_escalation = requires_escalation;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Number of findings at `High` severity or above.
    pub fn high_severity_count(&self) -> usize {
        count_high(&self.findings)
    }

    pub fn has_finding(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }
}

/// Count findings at `High` severity or above.
pub fn count_high(findings: &[Finding]) -> usize {
    findings.iter().filter(|f| f.severity >= Severity::High).count()
}

/// Sum of severity weights divided by the finding count; 0.0 when empty.
pub fn mean_severity(findings: &[Finding]) -> f64 {
    if findings.is_empty() {
        return 0.0;
    }
    let total: f64 = findings.iter().map(|f| f.severity.weight()).sum();
    total / findings.len() as f64
}

/// Clamp into [0, 1]; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
