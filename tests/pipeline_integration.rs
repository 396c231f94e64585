//! End-to-end pipeline tests: classification through dispatch, against the
//! in-memory and libSQL trace stores, with scripted action targets.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::timeout;

use docroute::actions::{
    ActionStatus, ActionTarget, ActionType, Priority, TargetRegistry, TargetResponse, TargetSystem,
};
use docroute::api::samples;
use docroute::config::{AppConfig, TargetConfig};
use docroute::error::TargetError;
use docroute::pipeline::types::{AgentKind, DocumentFormat, DocumentInput, FindingKind, Intent};
use docroute::pipeline::{Pipeline, SessionStatus};
use docroute::store::{LibSqlTraceStore, MemoryTraceStore, TraceStore};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Target that always answers the same way.
struct FixedTarget {
    system: TargetSystem,
    fail: bool,
    calls: AtomicUsize,
}

impl FixedTarget {
    fn ok(system: TargetSystem) -> Arc<Self> {
        Arc::new(Self {
            system,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn down(system: TargetSystem) -> Arc<Self> {
        Arc::new(Self {
            system,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ActionTarget for FixedTarget {
    fn system(&self) -> TargetSystem {
        self.system
    }

    async fn invoke(&self, _payload: &Map<String, Value>) -> Result<TargetResponse, TargetError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TargetError::Unavailable {
                target: self.system.name().to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(TargetResponse {
            reference_id: format!("{}-TEST-{n}", self.system.reference_prefix()),
            details: Map::new(),
        })
    }
}

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.dispatch.backoff_unit = Duration::from_millis(1);
    config.dispatch.backoff_jitter = 0.0;
    config
}

fn reliable_targets() -> TargetRegistry {
    TargetRegistry::simulated(&TargetConfig {
        latency: Duration::ZERO,
        failure_probability: 0.0,
    })
}

fn memory_pipeline(targets: TargetRegistry) -> (Pipeline, Arc<MemoryTraceStore>) {
    let store = Arc::new(MemoryTraceStore::new());
    (Pipeline::new(&fast_config(), targets, store.clone()), store)
}

#[tokio::test]
async fn angry_email_escalates_to_manager() {
    timeout(TEST_TIMEOUT, async {
        let (pipeline, store) = memory_pipeline(reliable_targets());
        let report = pipeline
            .process(DocumentInput::new(samples::SAMPLE_EMAIL))
            .await;

        assert_eq!(report.classification.format, DocumentFormat::Email);
        let analysis = report.analysis.as_ref().unwrap();
        assert_eq!(analysis.agent, AgentKind::Email);
        assert!(analysis.requires_escalation);
        assert_eq!(analysis.extracted_fields["sender"], "frustrated.customer@example.com");

        let action = report.action.as_ref().unwrap();
        assert_eq!(action.action_type, ActionType::EscalateToManager);
        assert_eq!(action.priority, Priority::High);

        let result = report.dispatch.as_ref().unwrap();
        assert!(result.is_success());
        assert!(result.external_reference_id.as_deref().unwrap().starts_with("MGR-"));

        let trace = store.session_trace(report.session_id).await.unwrap();
        assert_eq!(trace.extractions[0].agent, AgentKind::Email);
        assert_eq!(trace.attempts.len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn suspicious_transaction_is_blocked() {
    timeout(TEST_TIMEOUT, async {
        let (pipeline, _store) = memory_pipeline(reliable_targets());
        let content = r#"{"transaction_id":"T1","amount":15000,"user_id":"test_user","timestamp":"2024-01-15T00:00:00Z"}"#;
        let report = pipeline.process(DocumentInput::new(content)).await;

        let analysis = report.analysis.as_ref().unwrap();
        assert!(analysis.risk_score >= 0.5);
        assert!(analysis.has_finding(FindingKind::ValueOutOfRange));
        assert!(analysis.has_finding(FindingKind::SuspiciousPattern));
        assert_eq!(
            report.action.as_ref().unwrap().action_type,
            ActionType::BlockTransaction
        );
        assert!(
            report
                .dispatch
                .as_ref()
                .unwrap()
                .external_reference_id
                .as_deref()
                .unwrap()
                .starts_with("RISK-")
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_json_is_blocked_at_maximum_risk() {
    timeout(TEST_TIMEOUT, async {
        let (pipeline, _store) = memory_pipeline(reliable_targets());
        let report = pipeline
            .process(DocumentInput::new(r#"{"amount": 15000,}"#))
            .await;

        let analysis = report.analysis.as_ref().unwrap();
        assert_eq!(analysis.risk_score, 1.0);
        let action = report.action.as_ref().unwrap();
        assert_eq!(action.action_type, ActionType::BlockTransaction);
        assert_eq!(action.priority, Priority::Critical);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invoice_text_is_flagged_for_review() {
    timeout(TEST_TIMEOUT, async {
        let (pipeline, _store) = memory_pipeline(reliable_targets());
        let report = pipeline
            .process(DocumentInput::new(samples::SAMPLE_PDF_TEXT).with_filename("invoice.txt"))
            .await;

        assert_eq!(report.classification.format, DocumentFormat::Pdf);
        assert_eq!(report.classification.intent, Intent::Invoice);
        let analysis = report.analysis.as_ref().unwrap();
        assert_eq!(analysis.agent, AgentKind::Pdf);
        assert_eq!(analysis.extracted_fields["document_type"], "invoice");
        assert!(analysis.has_finding(FindingKind::HighAmount));
        assert_eq!(
            report.action.as_ref().unwrap().action_type,
            ActionType::FlagForReview
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn binary_pdf_upload_is_extracted_and_analyzed() {
    timeout(TEST_TIMEOUT, async {
        let (pipeline, store) = memory_pipeline(reliable_targets());
        let pdf = samples::render_pdf(&["Total Amount: $25,000.00"]);
        assert!(pdf.starts_with(b"%PDF-"));

        let report = pipeline.process_bytes(&pdf, Some("invoice.pdf".into())).await;

        assert_eq!(report.classification.format, DocumentFormat::Pdf);
        let analysis = report.analysis.as_ref().unwrap();
        assert_eq!(analysis.agent, AgentKind::Pdf);
        assert_eq!(analysis.extracted_fields["document_type"], "invoice");
        assert_eq!(analysis.extracted_fields["total_amount"], 25000.0);
        assert!(analysis.has_finding(FindingKind::HighAmount));
        assert!(!analysis.has_finding(FindingKind::ProcessingError));
        assert_eq!(
            report.action.as_ref().unwrap().action_type,
            ActionType::FlagForReview
        );

        let trace = store.session_trace(report.session_id).await.unwrap();
        assert_eq!(trace.extractions[0].agent, AgentKind::Pdf);
        assert_eq!(trace.attempts.len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn sample_invoice_pdf_matches_its_text_form() {
    timeout(TEST_TIMEOUT, async {
        let (pipeline, _store) = memory_pipeline(reliable_targets());
        let from_pdf = pipeline
            .route_bytes(&samples::sample_pdf(), Some("invoice.pdf".into()))
            .await;
        let from_text = pipeline
            .route(DocumentInput::new(samples::SAMPLE_PDF_TEXT).with_filename("invoice.pdf"))
            .await;

        let pdf_analysis = from_pdf.analysis.as_ref().unwrap();
        let text_analysis = from_text.analysis.as_ref().unwrap();
        assert_eq!(
            pdf_analysis.extracted_fields["document_type"],
            text_analysis.extracted_fields["document_type"]
        );
        assert_eq!(pdf_analysis.extracted_fields["total_amount"], 25000.0);
        assert!(pdf_analysis.has_finding(FindingKind::HighAmount));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn trace_preserves_agent_session_and_action() {
    timeout(TEST_TIMEOUT, async {
        let (pipeline, store) = memory_pipeline(reliable_targets());
        let inputs = [
            samples::SAMPLE_EMAIL.to_string(),
            samples::sample_json().to_string(),
            samples::SAMPLE_PDF_TEXT.to_string(),
        ];

        for content in inputs {
            let report = pipeline.process(DocumentInput::new(content)).await;
            let analysis = report.analysis.as_ref().unwrap();
            let action = report.action.as_ref().unwrap();

            let trace = store.session_trace(report.session_id).await.unwrap();
            assert_eq!(trace.session_id, report.session_id);
            assert_eq!(trace.extractions[0].agent, analysis.agent);
            for attempt in &trace.attempts {
                assert_eq!(attempt.session_id, report.session_id);
                assert_eq!(attempt.source_agent, analysis.agent);
                assert_eq!(attempt.action_type, action.action_type);
            }
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn persistent_failure_ends_in_failed_max_retries() {
    timeout(TEST_TIMEOUT, async {
        let target = FixedTarget::down(TargetSystem::RiskSystem);
        let targets = TargetRegistry::new().with_target(target.clone());
        let (pipeline, store) = memory_pipeline(targets);

        let report = pipeline
            .process(DocumentInput::new(samples::sample_json().to_string()))
            .await;

        let result = report.dispatch.as_ref().unwrap();
        assert_eq!(result.status, ActionStatus::FailedMaxRetries);
        assert!(result.external_reference_id.is_none());
        assert_eq!(report.dispatch_attempts, 4);
        assert_eq!(target.calls.load(Ordering::SeqCst), 4);

        let trace = store.session_trace(report.session_id).await.unwrap();
        let statuses: Vec<_> = trace.attempts.iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![
                ActionStatus::Retrying,
                ActionStatus::Retrying,
                ActionStatus::Retrying,
                ActionStatus::FailedMaxRetries,
            ]
        );
        let counts: Vec<_> = trace.attempts.iter().map(|a| a.retry_count).collect();
        assert_eq!(counts, vec![0, 1, 2, 3]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn one_sessions_backoff_does_not_stall_another() {
    timeout(TEST_TIMEOUT, async {
        let targets = TargetRegistry::new()
            .with_target(FixedTarget::down(TargetSystem::RiskSystem))
            .with_target(FixedTarget::ok(TargetSystem::ManagerNotification));
        let store = Arc::new(MemoryTraceStore::new());
        let mut config = fast_config();
        // 2 + 4 + 8 units of backoff before the failing session gives up.
        config.dispatch.backoff_unit = Duration::from_millis(100);
        let pipeline = Pipeline::new(&config, targets, store);

        let slow = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .process(DocumentInput::new(samples::sample_json().to_string()))
                    .await
            })
        };

        let started = Instant::now();
        let fast = pipeline
            .process(DocumentInput::new(samples::SAMPLE_EMAIL))
            .await;
        assert!(fast.dispatch.as_ref().unwrap().is_success());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!slow.is_finished());

        let slow = slow.await.unwrap();
        assert_eq!(
            slow.dispatch.as_ref().unwrap().status,
            ActionStatus::FailedMaxRetries
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn batch_processes_every_document() {
    timeout(TEST_TIMEOUT, async {
        let (pipeline, store) = memory_pipeline(reliable_targets());
        let reports = pipeline
            .process_batch(vec![
                DocumentInput::new(samples::SAMPLE_EMAIL),
                DocumentInput::new(samples::sample_json().to_string()),
                DocumentInput::new(samples::SAMPLE_PDF_TEXT),
                DocumentInput::new(""),
            ])
            .await;

        let statuses: Vec<_> = reports.iter().map(|r| r.as_ref().unwrap().status).collect();
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Dispatched,
                SessionStatus::Dispatched,
                SessionStatus::Dispatched,
                SessionStatus::Unrouted,
            ]
        );
        assert_eq!(store.session_count().await.unwrap(), 4);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn scores_stay_in_unit_interval() {
    let (pipeline, _store) = memory_pipeline(reliable_targets());
    let inputs = [
        "",
        "{",
        "[]",
        "[1, 2, 3]",
        r#"{"transaction_id": 7, "amount": "lots"}"#,
        r#"{"transaction_id":"T","amount":-5,"user_id":"admin","flags":["odd"]}"#,
        "WHY IS NOTHING WORKING!!!!!! I WILL SUE YOU",
        "From: x@y.z\n\n",
        "Policy GDPR HIPAA SOX FDA CCPA compliance regulation Total Amount: $9,999.99",
        "random words with nothing to say",
    ];

    for content in inputs {
        let report = pipeline.route(DocumentInput::new(content)).await;
        let c = &report.classification;
        for value in [c.confidence, c.format_confidence, c.intent_confidence] {
            assert!((0.0..=1.0).contains(&value), "{content:?}: {value}");
        }
        if let Some(analysis) = &report.analysis {
            assert!(
                (0.0..=1.0).contains(&analysis.risk_score),
                "{content:?}: {}",
                analysis.risk_score
            );
        }
    }
}

#[tokio::test]
async fn libsql_trace_store_records_full_session() {
    timeout(TEST_TIMEOUT, async {
        let store: Arc<dyn TraceStore> = Arc::new(LibSqlTraceStore::new_memory().await.unwrap());
        let pipeline = Pipeline::new(&fast_config(), reliable_targets(), store.clone());

        let report = pipeline
            .process(DocumentInput::new(samples::SAMPLE_EMAIL).with_filename("complaint.eml"))
            .await;

        let trace = store.session_trace(report.session_id).await.unwrap();
        let classification = trace.classification.unwrap();
        assert_eq!(classification.filename.as_deref(), Some("complaint.eml"));
        assert_eq!(classification.classification.format, DocumentFormat::Email);
        assert_eq!(classification.routing["route_to_agent"], "email_agent");
        assert_eq!(trace.extractions.len(), 1);
        assert_eq!(trace.attempts.len(), 1);
        assert_eq!(trace.attempts[0].action_type, ActionType::EscalateToManager);
        assert_eq!(trace.attempts[0].status, ActionStatus::Success);
        assert_eq!(store.session_count().await.unwrap(), 1);
    })
    .await
    .expect("test timed out");
}
