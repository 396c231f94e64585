//! REST endpoints over the pipeline.
//!
//! Classification and analysis are answered synchronously; the mapped action
//! is dispatched on a background task and shows up in `/session/{id}`.

use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::samples;
use crate::error::TraceError;
use crate::pipeline::types::{AgentKind, AnalysisResult, ClassificationResult, DocumentInput};
use crate::pipeline::{Pipeline, SessionReport, SessionStatus};

/// Upload size cap for `/process/file`.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            started_at: Instant::now(),
        }
    }
}

/// Build the Axum router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/process/text", post(process_text))
        .route("/process/file", post(process_file))
        .route("/session/{id}", get(get_session))
        .route("/demo/sample-data", get(sample_data))
        .route("/demo/sample.pdf", get(sample_pdf))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Info ────────────────────────────────────────────────────────────────

async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "docroute",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "active",
        "agents": ["classifier_agent", "email_agent", "json_agent", "pdf_agent"],
        "endpoints": {
            "process_text": "POST /process/text",
            "process_file": "POST /process/file?filename=",
            "get_session": "GET /session/{session_id}",
            "system_status": "GET /status",
            "sample_data": "GET /demo/sample-data",
            "sample_pdf": "GET /demo/sample.pdf",
        }
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "docroute"
    }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    match state.pipeline.trace().session_count().await {
        Ok(count) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "agents_active": ["classifier_agent", "email_agent", "json_agent", "pdf_agent"],
                "trace_store_connected": true,
                "total_sessions_processed": count,
                "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
            })),
        ),
        Err(e) => {
            error!(error = %e, "Failed to count sessions");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "trace_store_connected": false,
                    "error": e.to_string(),
                })),
            )
        }
    }
}

async fn sample_data() -> impl IntoResponse {
    Json(samples::sample_data())
}

async fn sample_pdf() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/pdf")], samples::sample_pdf())
}

// ── Processing ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TextRequest {
    content: String,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueuedAction {
    action_type: String,
    priority: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ProcessResponse {
    session_id: Uuid,
    status: SessionStatus,
    classification: ClassificationResult,
    route_to_agent: Option<AgentKind>,
    analysis: Option<AnalysisResult>,
    actions_taken: Vec<QueuedAction>,
}

/// Answer with the routed report and dispatch its action in the background.
fn respond_and_dispatch(state: &AppState, report: SessionReport) -> ProcessResponse {
    let mut actions_taken = Vec::new();
    if let Some(request) = &report.action {
        actions_taken.push(QueuedAction {
            action_type: request.action_type.to_string(),
            priority: request.priority.to_string(),
            status: "queued",
        });
        // Detached; the supervising task logs how the dispatch ended.
        let _ = state.pipeline.spawn_dispatch(&report);
    }

    ProcessResponse {
        session_id: report.session_id,
        status: report.status,
        route_to_agent: report.classification.format.agent(),
        classification: report.classification,
        analysis: report.analysis,
        actions_taken,
    }
}

async fn process_text(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> impl IntoResponse {
    let input = DocumentInput {
        content: request.content,
        filename: request.filename,
    };
    let report = state.pipeline.route(input).await;
    info!(session_id = %report.session_id, status = ?report.status, "Text processed");
    Json(respond_and_dispatch(&state, report))
}

async fn process_file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> impl IntoResponse {
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Empty upload"})),
        );
    }

    let report = state.pipeline.route_bytes(&body, query.filename).await;
    info!(
        session_id = %report.session_id,
        bytes = body.len(),
        status = ?report.status,
        "File processed"
    );
    let response = respond_and_dispatch(&state, report);
    (
        StatusCode::OK,
        Json(serde_json::to_value(response).unwrap_or(Value::Null)),
    )
}

// ── Sessions ────────────────────────────────────────────────────────────

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let session_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid session ID"})),
            );
        }
    };

    match state.pipeline.trace().session_trace(session_id).await {
        Ok(trace) => (
            StatusCode::OK,
            Json(serde_json::to_value(trace).unwrap_or(Value::Null)),
        ),
        Err(TraceError::SessionNotFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Session not found"})),
        ),
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to load session trace");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Failed to retrieve session: {e}")})),
            )
        }
    }
}
