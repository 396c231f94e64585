//! Session orchestrator: classify → analyze → map → dispatch.
//!
//! Every document gets its own session id and runs the stages strictly in
//! order. Sessions share nothing mutable except the trace store, so
//! `process_batch` runs each one on its own task and a retry backoff in one
//! session never stalls another.
//!
//! No stage aborts the session. Trace-store write failures are logged and
//! the pipeline carries on.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actions::{ActionRequest, ActionResult, DispatchOutcome, Dispatcher, TargetRegistry};
use crate::actions::mapper::map_analysis;
use crate::analyzers::extract::needs_extraction;
use crate::analyzers::{AnalyzerSet, PdfTextExtractor, TextExtractor};
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::pipeline::classifier::Classifier;
use crate::pipeline::types::{AnalysisResult, ClassificationResult, DocumentInput};
use crate::store::{ClassificationRecord, ExtractionRecord, TraceStore};

/// How far a session got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Format unknown; no analyzer ran.
    Unrouted,
    /// Analyzed and mapped; dispatch not run (yet).
    Analyzed,
    /// Dispatch reached a terminal result.
    Dispatched,
}

/// What one session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub classification: ClassificationResult,
    pub routing: Map<String, Value>,
    pub analysis: Option<AnalysisResult>,
    /// The mapped action request, before any retry bookkeeping.
    pub action: Option<ActionRequest>,
    /// Terminal dispatch result, once dispatched.
    pub dispatch: Option<ActionResult>,
    /// Number of dispatch attempts made.
    #[serde(default)]
    pub dispatch_attempts: usize,
}

impl SessionReport {
    fn apply(&mut self, outcome: DispatchOutcome) {
        self.dispatch_attempts = outcome.attempts.len();
        self.dispatch = Some(outcome.result);
        self.status = SessionStatus::Dispatched;
    }
}

/// The document pipeline. Cheap to clone; clones share the trace store and
/// the target registry.
#[derive(Clone)]
pub struct Pipeline {
    classifier: Arc<Classifier>,
    analyzers: Arc<AnalyzerSet>,
    extractor: Arc<dyn TextExtractor>,
    dispatcher: Dispatcher,
    trace: Arc<dyn TraceStore>,
    max_retries: u32,
}

impl Pipeline {
    pub fn new(config: &AppConfig, targets: TargetRegistry, trace: Arc<dyn TraceStore>) -> Self {
        Self {
            classifier: Arc::new(Classifier::new(config.classifier.clone())),
            analyzers: Arc::new(AnalyzerSet::from_config(config)),
            extractor: Arc::new(PdfTextExtractor),
            dispatcher: Dispatcher::new(targets, trace.clone(), config.dispatch.clone()),
            trace,
            max_retries: config.dispatch.max_retries,
        }
    }

    /// Swap the text extractor used for binary uploads.
    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn trace(&self) -> &Arc<dyn TraceStore> {
        &self.trace
    }

    /// Classify and analyze; the mapped action is returned, not dispatched.
    pub async fn route(&self, input: DocumentInput) -> SessionReport {
        let classification = self
            .classifier
            .classify(&input.content, input.filename.as_deref());
        let analysis = self
            .analyzers
            .for_format(classification.format)
            .map(|analyzer| analyzer.analyze(&input.content));
        self.open_session(input.filename, classification, analysis)
            .await
    }

    /// Full session: route, then dispatch the mapped action to completion.
    pub async fn process(&self, input: DocumentInput) -> SessionReport {
        let mut report = self.route(input).await;
        if let Some(request) = report.action.clone() {
            report.apply(self.dispatcher.dispatch(request).await);
        }
        report
    }

    /// Route uploaded bytes. PDFs go through the text extractor; an
    /// extraction failure becomes a processing-error analysis.
    pub async fn route_bytes(&self, bytes: &[u8], filename: Option<String>) -> SessionReport {
        if !needs_extraction(bytes, filename.as_deref()) {
            let content = String::from_utf8_lossy(bytes).into_owned();
            return self
                .route(DocumentInput {
                    content,
                    filename,
                })
                .await;
        }

        match self.extractor.extract(bytes) {
            Ok(content) => self.route(DocumentInput { content, filename }).await,
            Err(e) => {
                warn!(filename = ?filename, error = %e, "Text extraction failed");
                let classification = self.classifier.unreadable_document(&e.to_string());
                let analysis = self.analyzers.pdf.extraction_failed(&e);
                self.open_session(filename, classification, Some(analysis))
                    .await
            }
        }
    }

    /// `route_bytes` followed by dispatch.
    pub async fn process_bytes(&self, bytes: &[u8], filename: Option<String>) -> SessionReport {
        let mut report = self.route_bytes(bytes, filename).await;
        if let Some(request) = report.action.clone() {
            report.apply(self.dispatcher.dispatch(request).await);
        }
        report
    }

    /// Dispatch a routed session's action on its own task. The returned
    /// handle may be dropped; a failed dispatch task is logged either way.
    pub fn spawn_dispatch(
        &self,
        report: &SessionReport,
    ) -> Option<JoinHandle<Result<DispatchOutcome, PipelineError>>> {
        let request = report.action.clone()?;
        let session_id = report.session_id;
        let dispatcher = self.dispatcher.clone();
        let task = tokio::spawn(async move { dispatcher.dispatch(request).await });
        Some(tokio::spawn(supervise_dispatch(session_id, task)))
    }

    /// Process independent documents concurrently, one task per document.
    /// Results come back in input order.
    pub async fn process_batch(
        &self,
        inputs: Vec<DocumentInput>,
    ) -> Vec<Result<SessionReport, PipelineError>> {
        let count = inputs.len();
        info!(count, "Processing document batch");

        let handles: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let pipeline = self.clone();
                tokio::spawn(async move { pipeline.process(input).await })
            })
            .collect();

        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.map_err(|e| PipelineError::Task(e.to_string())))
            .collect();

        info!(
            processed = results.iter().filter(|r| r.is_ok()).count(),
            total = count,
            "Batch processing complete"
        );
        results
    }

    /// Record classification and analysis for a new session and map the
    /// analysis to an action.
    async fn open_session(
        &self,
        filename: Option<String>,
        classification: ClassificationResult,
        analysis: Option<AnalysisResult>,
    ) -> SessionReport {
        let session_id = Uuid::new_v4();
        let routing = self.classifier.routing_metadata(&classification);

        let record = ClassificationRecord::new(
            session_id,
            filename.clone(),
            classification.clone(),
            routing.clone(),
        );
        if let Err(e) = self.trace.record_classification(&record).await {
            warn!(session_id = %session_id, error = %e, "Failed to record classification");
        }

        let Some(analysis) = analysis else {
            info!(
                session_id = %session_id,
                format = %classification.format,
                "Document format unknown; not routed"
            );
            return SessionReport {
                session_id,
                status: SessionStatus::Unrouted,
                filename,
                classification,
                routing,
                analysis: None,
                action: None,
                dispatch: None,
                dispatch_attempts: 0,
            };
        };

        info!(
            session_id = %session_id,
            agent = %analysis.agent,
            risk_score = analysis.risk_score,
            suggested_action = %analysis.suggested_action,
            findings = analysis.findings.len(),
            "Document analyzed"
        );

        let extraction = ExtractionRecord::from_analysis(session_id, &analysis);
        if let Err(e) = self.trace.record_extraction(&extraction).await {
            warn!(session_id = %session_id, error = %e, "Failed to record extraction");
        }

        let request = map_analysis(session_id, &analysis, self.max_retries);
        debug!(
            session_id = %session_id,
            action = %request.action_type,
            priority = %request.priority,
            "Action queued"
        );

        SessionReport {
            session_id,
            status: SessionStatus::Analyzed,
            filename,
            classification,
            routing,
            analysis: Some(analysis),
            action: Some(request),
            dispatch: None,
            dispatch_attempts: 0,
        }
    }
}

/// Await a background dispatch and log how it ended.
async fn supervise_dispatch(
    session_id: Uuid,
    task: JoinHandle<DispatchOutcome>,
) -> Result<DispatchOutcome, PipelineError> {
    match task.await {
        Ok(outcome) => {
            info!(
                session_id = %session_id,
                status = %outcome.result.status,
                attempts = outcome.attempts.len(),
                "Background dispatch finished"
            );
            Ok(outcome)
        }
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Background dispatch task failed");
            Err(PipelineError::Task(e.to_string()))
        }
    }
}
