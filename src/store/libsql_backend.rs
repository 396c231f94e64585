//! libSQL backend for the session-trace store.
//!
//! Supports local file and in-memory databases. Structured values (fields,
//! findings, details) are stored as JSON text next to the scalar columns used
//! for filtering.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::actions::model::{ActionStatus, ActionType, Priority};
use crate::error::TraceError;
use crate::pipeline::types::{AgentKind, ClassificationResult, Finding};
use crate::store::migrations;
use crate::store::traits::{
    AttemptRecord, ClassificationRecord, ExtractionRecord, SessionTrace, TraceStore,
};

/// libSQL trace store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlTraceStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlTraceStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, TraceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TraceError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TraceError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| TraceError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Trace database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, TraceError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                TraceError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| TraceError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn load_classification(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ClassificationRecord>, TraceError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT filename, classification, routing, recorded_at
                 FROM classifications WHERE session_id = ?1",
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| TraceError::Query(format!("load_classification: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let filename: Option<String> = row.get(0).ok();
                let classification: String = row.get(1).map_err(query_err)?;
                let routing: String = row.get(2).map_err(query_err)?;
                let recorded_at: String = row.get(3).map_err(query_err)?;
                Ok(Some(ClassificationRecord {
                    session_id,
                    filename,
                    classification: serde_json::from_str::<ClassificationResult>(
                        &classification,
                    )?,
                    routing: parse_map(&routing)?,
                    recorded_at: parse_datetime(&recorded_at),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TraceError::Query(format!("load_classification: {e}"))),
        }
    }

    async fn load_extractions(&self, session_id: Uuid) -> Result<Vec<ExtractionRecord>, TraceError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT agent, extracted_fields, risk_score, suggested_action, findings, recorded_at
                 FROM extractions WHERE session_id = ?1 ORDER BY id ASC",
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| TraceError::Query(format!("load_extractions: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let agent: String = row.get(0).map_err(query_err)?;
            let fields: String = row.get(1).map_err(query_err)?;
            let risk_score: f64 = row.get(2).map_err(query_err)?;
            let suggested_action: String = row.get(3).map_err(query_err)?;
            let findings: String = row.get(4).map_err(query_err)?;
            let recorded_at: String = row.get(5).map_err(query_err)?;

            records.push(ExtractionRecord {
                session_id,
                agent: parse_agent(&agent)?,
                extracted_fields: parse_map(&fields)?,
                risk_score,
                suggested_action,
                findings: serde_json::from_str::<Vec<Finding>>(&findings)?,
                recorded_at: parse_datetime(&recorded_at),
            });
        }
        Ok(records)
    }

    async fn load_attempts(&self, session_id: Uuid) -> Result<Vec<AttemptRecord>, TraceError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT action_type, priority, source_agent, status, message, details,
                        external_reference_id, retry_count, execution_time_ms, recorded_at
                 FROM dispatch_attempts WHERE session_id = ?1 ORDER BY id ASC",
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| TraceError::Query(format!("load_attempts: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let action_type: String = row.get(0).map_err(query_err)?;
            let priority: String = row.get(1).map_err(query_err)?;
            let source_agent: String = row.get(2).map_err(query_err)?;
            let status: String = row.get(3).map_err(query_err)?;
            let message: String = row.get(4).map_err(query_err)?;
            let details: String = row.get(5).map_err(query_err)?;
            let external_reference_id: Option<String> = row.get(6).ok();
            let retry_count: i64 = row.get(7).map_err(query_err)?;
            let execution_time_ms: i64 = row.get(8).map_err(query_err)?;
            let recorded_at: String = row.get(9).map_err(query_err)?;

            records.push(AttemptRecord {
                session_id,
                action_type: ActionType::from_str_opt(&action_type).ok_or_else(|| {
                    TraceError::Query(format!("unknown action type '{action_type}'"))
                })?,
                priority: Priority::from_str_opt(&priority)
                    .ok_or_else(|| TraceError::Query(format!("unknown priority '{priority}'")))?,
                source_agent: parse_agent(&source_agent)?,
                status: ActionStatus::from_str_opt(&status)
                    .ok_or_else(|| TraceError::Query(format!("unknown status '{status}'")))?,
                message,
                details: parse_map(&details)?,
                external_reference_id,
                retry_count: u32::try_from(retry_count).unwrap_or(0),
                execution_time_ms: u64::try_from(execution_time_ms).unwrap_or(0),
                recorded_at: parse_datetime(&recorded_at),
            });
        }
        Ok(records)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_map(s: &str) -> Result<Map<String, Value>, TraceError> {
    match serde_json::from_str::<Value>(s)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn parse_agent(s: &str) -> Result<AgentKind, TraceError> {
    AgentKind::from_name(s).ok_or_else(|| TraceError::Query(format!("unknown agent '{s}'")))
}

fn query_err(e: libsql::Error) -> TraceError {
    TraceError::Query(format!("row parse: {e}"))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl TraceStore for LibSqlTraceStore {
    async fn record_classification(
        &self,
        record: &ClassificationRecord,
    ) -> Result<(), TraceError> {
        let classification = serde_json::to_string(&record.classification)?;
        let routing = serde_json::to_string(&record.routing)?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO classifications
                    (session_id, filename, format, intent, confidence, classification, routing, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.session_id.to_string(),
                    opt_text(record.filename.as_deref()),
                    record.classification.format.as_str(),
                    record.classification.intent.as_str(),
                    record.classification.confidence,
                    classification,
                    routing,
                    record.recorded_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| TraceError::Query(format!("record_classification: {e}")))?;

        debug!(session_id = %record.session_id, "Classification recorded");
        Ok(())
    }

    async fn record_extraction(&self, record: &ExtractionRecord) -> Result<(), TraceError> {
        let fields = serde_json::to_string(&record.extracted_fields)?;
        let findings = serde_json::to_string(&record.findings)?;
        self.conn()
            .execute(
                "INSERT INTO extractions
                    (session_id, agent, extracted_fields, risk_score, suggested_action, findings, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.session_id.to_string(),
                    record.agent.name(),
                    fields,
                    record.risk_score,
                    record.suggested_action.clone(),
                    findings,
                    record.recorded_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| TraceError::Query(format!("record_extraction: {e}")))?;

        debug!(session_id = %record.session_id, agent = %record.agent, "Extraction recorded");
        Ok(())
    }

    async fn record_attempt(&self, record: &AttemptRecord) -> Result<(), TraceError> {
        let details = serde_json::to_string(&record.details)?;
        self.conn()
            .execute(
                "INSERT INTO dispatch_attempts
                    (session_id, action_type, priority, source_agent, status, message, details,
                     external_reference_id, retry_count, execution_time_ms, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.session_id.to_string(),
                    record.action_type.as_str(),
                    record.priority.as_str(),
                    record.source_agent.name(),
                    record.status.as_str(),
                    record.message.clone(),
                    details,
                    opt_text(record.external_reference_id.as_deref()),
                    i64::from(record.retry_count),
                    i64::try_from(record.execution_time_ms).unwrap_or(i64::MAX),
                    record.recorded_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| TraceError::Query(format!("record_attempt: {e}")))?;

        debug!(
            session_id = %record.session_id,
            status = %record.status,
            retry_count = record.retry_count,
            "Dispatch attempt recorded"
        );
        Ok(())
    }

    async fn session_trace(&self, session_id: Uuid) -> Result<SessionTrace, TraceError> {
        let trace = SessionTrace {
            session_id,
            classification: self.load_classification(session_id).await?,
            extractions: self.load_extractions(session_id).await?,
            attempts: self.load_attempts(session_id).await?,
        };

        if trace.classification.is_none() && trace.extractions.is_empty() && trace.attempts.is_empty()
        {
            return Err(TraceError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        Ok(trace)
    }

    async fn session_count(&self) -> Result<u64, TraceError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM classifications", ())
            .await
            .map_err(|e| TraceError::Query(format!("session_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(query_err)?;
                Ok(u64::try_from(count).unwrap_or(0))
            }
            Ok(None) => Ok(0),
            Err(e) => Err(TraceError::Query(format!("session_count: {e}"))),
        }
    }
}
