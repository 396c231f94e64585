//! `TraceStore` trait: the append-only, session-keyed log the pipeline writes
//! every decision to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::actions::model::{ActionRequest, ActionResult, ActionStatus, ActionType, Priority};
use crate::error::TraceError;
use crate::pipeline::types::{AgentKind, AnalysisResult, ClassificationResult, Finding};

/// One classification per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub session_id: Uuid,
    pub filename: Option<String>,
    pub classification: ClassificationResult,
    pub routing: Map<String, Value>,
    pub recorded_at: DateTime<Utc>,
}

impl ClassificationRecord {
    pub fn new(
        session_id: Uuid,
        filename: Option<String>,
        classification: ClassificationResult,
        routing: Map<String, Value>,
    ) -> Self {
        Self {
            session_id,
            filename,
            classification,
            routing,
            recorded_at: Utc::now(),
        }
    }
}

/// One analyzer invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub session_id: Uuid,
    pub agent: AgentKind,
    pub extracted_fields: Map<String, Value>,
    pub risk_score: f64,
    pub suggested_action: String,
    pub findings: Vec<Finding>,
    pub recorded_at: DateTime<Utc>,
}

impl ExtractionRecord {
    pub fn from_analysis(session_id: Uuid, analysis: &AnalysisResult) -> Self {
        Self {
            session_id,
            agent: analysis.agent,
            extracted_fields: analysis.extracted_fields.clone(),
            risk_score: analysis.risk_score,
            suggested_action: analysis.suggested_action.keyword().to_string(),
            findings: analysis.findings.clone(),
            recorded_at: Utc::now(),
        }
    }
}

/// One dispatch attempt. Never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub session_id: Uuid,
    pub action_type: ActionType,
    pub priority: Priority,
    pub source_agent: AgentKind,
    pub status: ActionStatus,
    pub message: String,
    pub details: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference_id: Option<String>,
    pub retry_count: u32,
    pub execution_time_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn from_attempt(request: &ActionRequest, result: &ActionResult) -> Self {
        Self {
            session_id: request.session_id,
            action_type: request.action_type,
            priority: request.priority,
            source_agent: request.source_agent,
            status: result.status,
            message: result.message.clone(),
            details: result.details.clone(),
            external_reference_id: result.external_reference_id.clone(),
            retry_count: result.retry_count,
            execution_time_ms: result.execution_time_ms,
            recorded_at: result.completed_at,
        }
    }
}

/// Everything recorded for one session, in write order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTrace {
    pub session_id: Uuid,
    pub classification: Option<ClassificationRecord>,
    pub extractions: Vec<ExtractionRecord>,
    pub attempts: Vec<AttemptRecord>,
}

impl SessionTrace {
    pub fn empty(session_id: Uuid) -> Self {
        Self {
            session_id,
            classification: None,
            extractions: Vec::new(),
            attempts: Vec::new(),
        }
    }

    /// The last attempt, which holds the terminal status once dispatch ends.
    pub fn final_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }
}

/// Session-trace sink. Implementations must accept concurrent appends from
/// different sessions.
#[async_trait]
pub trait TraceStore: Send + Sync {
    // ── Writes ──────────────────────────────────────────────────────

    async fn record_classification(&self, record: &ClassificationRecord)
    -> Result<(), TraceError>;

    async fn record_extraction(&self, record: &ExtractionRecord) -> Result<(), TraceError>;

    async fn record_attempt(&self, record: &AttemptRecord) -> Result<(), TraceError>;

    // ── Reads ───────────────────────────────────────────────────────

    /// Full ordered trace, or `SessionNotFound` when nothing was recorded.
    async fn session_trace(&self, session_id: Uuid) -> Result<SessionTrace, TraceError>;

    /// Number of sessions with at least a classification record.
    async fn session_count(&self) -> Result<u64, TraceError>;
}
