//! Action dispatcher: runs one `ActionRequest` against its target under the
//! retry state machine and records every attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::actions::model::{ActionRequest, ActionResult, ActionStatus, ActionType};
use crate::actions::state::{DispatchState, DispatchTracker};
use crate::actions::targets::{ActionTarget, TargetRegistry, TargetResponse, TargetSystem, build_payload};
use crate::config::DispatchConfig;
use crate::error::TargetError;
use crate::store::{AttemptRecord, TraceStore};

/// Exponent cap for the backoff; keeps `2^n` units finite for large budgets.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Ceiling for a single backoff sleep before jitter.
const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Everything one dispatch produced.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The request as it stood at the end (final `retry_count`).
    pub request: ActionRequest,
    /// Terminal result: `Success`, `Failed` or `FailedMaxRetries`.
    pub result: ActionResult,
    /// One result per attempt, in order. The last one equals `result`.
    pub attempts: Vec<ActionResult>,
    pub tracker: DispatchTracker,
}

/// Sleep before the attempt that will run with `retry_count`: `2^retry_count`
/// backoff units, jittered.
pub fn backoff_delay(config: &DispatchConfig, retry_count: u32) -> Duration {
    let exponent = retry_count.min(MAX_BACKOFF_EXPONENT);
    let base = config
        .backoff_unit
        .saturating_mul(1u32 << exponent)
        .min(MAX_BACKOFF_DELAY);
    if config.backoff_jitter <= 0.0 {
        return base;
    }
    let jitter = config.backoff_jitter;
    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
    base.mul_f64(factor)
}

/// Executes action requests. Cheap to clone; each pipeline owns the
/// requests it dispatches, so concurrent sessions share nothing mutable
/// beyond the trace store.
#[derive(Clone)]
pub struct Dispatcher {
    targets: TargetRegistry,
    trace: Arc<dyn TraceStore>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(targets: TargetRegistry, trace: Arc<dyn TraceStore>, config: DispatchConfig) -> Self {
        Self {
            targets,
            trace,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run `request` to a terminal result. Never fails: target errors and
    /// trace-store errors end up in the result or the log.
    pub async fn dispatch(&self, mut request: ActionRequest) -> DispatchOutcome {
        let mut tracker = DispatchTracker::new();
        let mut attempts = Vec::new();

        let Some(system) = TargetSystem::for_action(request.action_type) else {
            let result = self.complete_locally(&mut tracker, &request);
            self.record(&request, &result).await;
            attempts.push(result.clone());
            return DispatchOutcome {
                request,
                result,
                attempts,
                tracker,
            };
        };

        let target = self.targets.get(system);
        let payload = build_payload(system, &request);

        loop {
            advance(&mut tracker, DispatchState::InProgress, None);
            let started = Instant::now();
            let outcome = self.invoke(system, target.as_deref(), &payload).await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(response) => {
                    advance(&mut tracker, DispatchState::Success, None);
                    let result = success_result(system, &request, response, elapsed);
                    info!(
                        session_id = %request.session_id,
                        action = %request.action_type,
                        target_system = %system,
                        attempt = request.retry_count + 1,
                        reference = result.external_reference_id.as_deref().unwrap_or(""),
                        "Action dispatched"
                    );
                    self.record(&request, &result).await;
                    attempts.push(result.clone());
                    return DispatchOutcome {
                        request,
                        result,
                        attempts,
                        tracker,
                    };
                }
                Err(err) => {
                    advance(&mut tracker, DispatchState::Failed, Some(err.to_string()));

                    if !err.is_retryable() {
                        tracker.settle();
                        let result =
                            failure_result(system, &request, &err, ActionStatus::Failed, elapsed);
                        error!(
                            session_id = %request.session_id,
                            action = %request.action_type,
                            target_system = %system,
                            error = %err,
                            "Action rejected; not retrying"
                        );
                        self.record(&request, &result).await;
                        attempts.push(result.clone());
                        return DispatchOutcome {
                            request,
                            result,
                            attempts,
                            tracker,
                        };
                    }

                    if !request.can_retry() {
                        advance(
                            &mut tracker,
                            DispatchState::FailedMaxRetries,
                            Some(format!("{} retries exhausted", request.max_retries)),
                        );
                        let result = failure_result(
                            system,
                            &request,
                            &err,
                            ActionStatus::FailedMaxRetries,
                            elapsed,
                        );
                        error!(
                            session_id = %request.session_id,
                            action = %request.action_type,
                            target_system = %system,
                            attempts = request.retry_count + 1,
                            error = %err,
                            "Action failed after max retries"
                        );
                        self.record(&request, &result).await;
                        attempts.push(result.clone());
                        return DispatchOutcome {
                            request,
                            result,
                            attempts,
                            tracker,
                        };
                    }

                    let result =
                        failure_result(system, &request, &err, ActionStatus::Retrying, elapsed);
                    self.record(&request, &result).await;
                    attempts.push(result);

                    advance(&mut tracker, DispatchState::Retrying, None);
                    request.retry_count += 1;
                    let delay = backoff_delay(&self.config, request.retry_count);
                    warn!(
                        session_id = %request.session_id,
                        action = %request.action_type,
                        target_system = %system,
                        retry = request.retry_count,
                        max_retries = request.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Action attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn invoke(
        &self,
        system: TargetSystem,
        target: Option<&dyn ActionTarget>,
        payload: &Map<String, Value>,
    ) -> Result<TargetResponse, TargetError> {
        let Some(target) = target else {
            return Err(TargetError::Rejected {
                target: system.name().to_string(),
                reason: "no target registered".into(),
            });
        };

        let timeout = self.config.attempt_timeout;
        match tokio::time::timeout(timeout, target.invoke(payload)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TargetError::TimedOut {
                target: system.name().to_string(),
                timeout,
            }),
        }
    }

    /// `NoAction` has no target; it succeeds in place.
    fn complete_locally(
        &self,
        tracker: &mut DispatchTracker,
        request: &ActionRequest,
    ) -> ActionResult {
        advance(tracker, DispatchState::InProgress, None);
        advance(tracker, DispatchState::Success, Some("no action required".into()));
        debug!(session_id = %request.session_id, "No action required");

        let mut details = Map::new();
        details.insert("action".into(), json!(ActionType::NoAction.as_str()));
        ActionResult {
            status: ActionStatus::Success,
            message: "No action required".into(),
            external_reference_id: Some(format!("NOOP-{}", request.session_id)),
            details,
            retry_count: request.retry_count,
            execution_time_ms: 0,
            completed_at: Utc::now(),
        }
    }

    async fn record(&self, request: &ActionRequest, result: &ActionResult) {
        let record = AttemptRecord::from_attempt(request, result);
        if let Err(e) = self.trace.record_attempt(&record).await {
            warn!(
                session_id = %request.session_id,
                status = %result.status,
                error = %e,
                "Failed to record dispatch attempt"
            );
        }
    }
}

/// Apply a transition the loop knows to be valid; a refusal is logged.
fn advance(tracker: &mut DispatchTracker, state: DispatchState, reason: Option<String>) {
    if let Err(e) = tracker.transition_to(state, reason) {
        warn!(error = %e, "Unexpected dispatch transition");
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn success_result(
    system: TargetSystem,
    request: &ActionRequest,
    response: TargetResponse,
    elapsed: Duration,
) -> ActionResult {
    let mut details = response.details;
    details.insert("target_system".into(), json!(system.name()));
    ActionResult {
        status: ActionStatus::Success,
        message: format!("{} completed via {}", request.action_type, system),
        external_reference_id: Some(response.reference_id),
        details,
        retry_count: request.retry_count,
        execution_time_ms: elapsed_ms(elapsed),
        completed_at: Utc::now(),
    }
}

fn failure_result(
    system: TargetSystem,
    request: &ActionRequest,
    err: &TargetError,
    status: ActionStatus,
    elapsed: Duration,
) -> ActionResult {
    let message = match status {
        ActionStatus::Retrying => format!(
            "Attempt {} of {} failed, retrying",
            request.retry_count + 1,
            request.max_retries + 1
        ),
        ActionStatus::FailedMaxRetries => {
            format!("Failed after {} retries", request.max_retries)
        }
        _ => format!("{} failed permanently", request.action_type),
    };

    let mut details = Map::new();
    details.insert("target_system".into(), json!(system.name()));
    details.insert("error".into(), json!(err.to_string()));
    details.insert("retryable".into(), json!(err.is_retryable()));

    ActionResult {
        status,
        message,
        external_reference_id: None,
        details,
        retry_count: request.retry_count,
        execution_time_ms: elapsed_ms(elapsed),
        completed_at: Utc::now(),
    }
}
