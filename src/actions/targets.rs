//! External action targets.
//!
//! The dispatcher only needs one protocol from the outside world: invoke a
//! target with a payload, get back a reference id and details or a failure.
//! `SimulatedTarget` stands in for the real systems with latency and a
//! random failure rate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::actions::model::{ActionRequest, ActionType, Priority};
use crate::config::TargetConfig;
use crate::error::TargetError;

/// External system an action lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSystem {
    Crm,
    ManagerNotification,
    RiskSystem,
    ComplianceLog,
    Archive,
}

impl TargetSystem {
    pub const ALL: [TargetSystem; 5] = [
        TargetSystem::Crm,
        TargetSystem::ManagerNotification,
        TargetSystem::RiskSystem,
        TargetSystem::ComplianceLog,
        TargetSystem::Archive,
    ];

    /// Where `action` is sent; `None` means it completes locally.
    pub fn for_action(action: ActionType) -> Option<Self> {
        match action {
            ActionType::EscalateToCrm | ActionType::StandardResponse => Some(Self::Crm),
            ActionType::EscalateToManager => Some(Self::ManagerNotification),
            ActionType::BlockTransaction | ActionType::FlagForReview => Some(Self::RiskSystem),
            ActionType::ComplianceAlert | ActionType::LogWarning => Some(Self::ComplianceLog),
            ActionType::ArchiveDocument => Some(Self::Archive),
            ActionType::NoAction => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Crm => "crm",
            Self::ManagerNotification => "manager_notification",
            Self::RiskSystem => "risk_system",
            Self::ComplianceLog => "compliance_log",
            Self::Archive => "archive",
        }
    }

    /// Prefix of the reference ids this system issues.
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            Self::Crm => "CRM",
            Self::ManagerNotification => "MGR",
            Self::RiskSystem => "RISK",
            Self::ComplianceLog => "COMP",
            Self::Archive => "ARCH",
        }
    }
}

impl std::fmt::Display for TargetSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Successful target answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResponse {
    pub reference_id: String,
    pub details: Map<String, Value>,
}

/// An external system that accepts actions.
#[async_trait]
pub trait ActionTarget: Send + Sync {
    fn system(&self) -> TargetSystem;

    /// Deliver one payload. Errors say whether a retry could help.
    async fn invoke(&self, payload: &Map<String, Value>) -> Result<TargetResponse, TargetError>;
}

/// Assemble the payload `system` expects from a request.
pub fn build_payload(system: TargetSystem, request: &ActionRequest) -> Map<String, Value> {
    let session = request.session_id.to_string();
    let source = request.source_agent.name();
    let priority = request.priority.as_str();
    let p = |key: &str| request.payload.get(key).cloned().unwrap_or(Value::Null);

    let value = match system {
        TargetSystem::Crm => json!({
            "subject": format!("Escalation from {source}"),
            "priority": priority,
            "customer_email": request.payload_str("sender", "unknown@example.com"),
            "email_subject": p("subject"),
            "tone": request.payload_str("tone", "neutral"),
            "urgency": request.payload_str("urgency", "medium"),
            "keywords": p("keywords"),
            "session_id": session,
        }),
        TargetSystem::ManagerNotification => json!({
            "alert_type": "manager_escalation",
            "priority": priority,
            "source_agent": source,
            "issue_summary": request.payload_str("subject", "Issue requires manager attention"),
            "customer_email": p("sender"),
            "tone": p("tone"),
            "session_id": session,
        }),
        TargetSystem::RiskSystem => json!({
            "action": request.action_type.as_str(),
            "transaction_id": request.payload_str("transaction_id", "unknown"),
            "risk_level": priority,
            "risk_score": p("risk_score"),
            "anomalies": p("findings"),
            "requires_investigation": request.priority >= Priority::High,
            "detection_agent": source,
            "session_id": session,
        }),
        TargetSystem::ComplianceLog => json!({
            "action": request.action_type.as_str(),
            "severity": priority,
            "document_type": request.payload_str("document_type", "unknown"),
            "regulatory_keywords": p("compliance_keywords"),
            "findings": p("findings"),
            "source_agent": source,
            "session_id": session,
        }),
        TargetSystem::Archive => json!({
            "document_type": request.payload_str("document_type", "unknown"),
            "source_agent": source,
            "session_id": session,
        }),
    };

    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Target with simulated latency and random transient failures.
pub struct SimulatedTarget {
    system: TargetSystem,
    config: TargetConfig,
}

impl SimulatedTarget {
    pub fn new(system: TargetSystem, config: TargetConfig) -> Self {
        Self { system, config }
    }

    fn details(&self, payload: &Map<String, Value>) -> Map<String, Value> {
        let get = |k: &str| payload.get(k).cloned().unwrap_or(Value::Null);
        let value = match self.system {
            TargetSystem::Crm => json!({
                "status": "created",
                "priority": get("priority"),
                "assigned_to": "support_team_lead",
            }),
            TargetSystem::ManagerNotification => json!({
                "sent_to": ["manager@company.com", "supervisor@company.com"],
                "delivery_status": "sent",
            }),
            TargetSystem::RiskSystem => json!({
                "risk_level": get("risk_level"),
                "status": "active",
                "investigation_required": get("requires_investigation"),
            }),
            TargetSystem::ComplianceLog => json!({
                "status": "under_review",
                "severity": get("severity"),
            }),
            TargetSystem::Archive => json!({
                "status": "archived",
                "retention": "7_years",
            }),
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

#[async_trait]
impl ActionTarget for SimulatedTarget {
    fn system(&self) -> TargetSystem {
        self.system
    }

    async fn invoke(&self, payload: &Map<String, Value>) -> Result<TargetResponse, TargetError> {
        tokio::time::sleep(self.config.latency).await;

        let roll: f64 = rand::random();
        if roll < self.config.failure_probability {
            debug!(target_system = %self.system, "Simulated target failure");
            return Err(TargetError::Unavailable {
                target: self.system.name().to_string(),
                reason: "simulated outage".into(),
            });
        }

        let reference_id = format!(
            "{}-{}-{}",
            self.system.reference_prefix(),
            Utc::now().format("%Y%m%d%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..6]
        );
        Ok(TargetResponse {
            reference_id,
            details: self.details(payload),
        })
    }
}

/// Target per system.
#[derive(Clone, Default)]
pub struct TargetRegistry {
    targets: HashMap<TargetSystem, Arc<dyn ActionTarget>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated targets for every system.
    pub fn simulated(config: &TargetConfig) -> Self {
        TargetSystem::ALL
            .into_iter()
            .fold(Self::new(), |registry, system| {
                registry.with_target(Arc::new(SimulatedTarget::new(system, config.clone())))
            })
    }

    /// Register (or replace) the target for its system.
    pub fn with_target(mut self, target: Arc<dyn ActionTarget>) -> Self {
        self.targets.insert(target.system(), target);
        self
    }

    pub fn get(&self, system: TargetSystem) -> Option<Arc<dyn ActionTarget>> {
        self.targets.get(&system).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::AgentKind;
    use std::time::Duration;

    fn request(action: ActionType, payload: Map<String, Value>) -> ActionRequest {
        ActionRequest::new(
            Uuid::new_v4(),
            action,
            Priority::High,
            payload,
            AgentKind::Email,
            3,
        )
    }

    fn instant(failure_probability: f64) -> TargetConfig {
        TargetConfig {
            latency: Duration::ZERO,
            failure_probability,
        }
    }

    #[test]
    fn routing_table() {
        assert_eq!(
            TargetSystem::for_action(ActionType::EscalateToCrm),
            Some(TargetSystem::Crm)
        );
        assert_eq!(
            TargetSystem::for_action(ActionType::BlockTransaction),
            Some(TargetSystem::RiskSystem)
        );
        assert_eq!(
            TargetSystem::for_action(ActionType::LogWarning),
            Some(TargetSystem::ComplianceLog)
        );
        assert_eq!(
            TargetSystem::for_action(ActionType::ArchiveDocument),
            Some(TargetSystem::Archive)
        );
        assert_eq!(TargetSystem::for_action(ActionType::NoAction), None);
    }

    #[test]
    fn crm_payload_uses_email_fields() {
        let mut payload = Map::new();
        payload.insert("sender".into(), json!("jane@example.com"));
        payload.insert("tone".into(), json!("angry"));
        let req = request(ActionType::EscalateToCrm, payload);
        let built = build_payload(TargetSystem::Crm, &req);
        assert_eq!(built["customer_email"], "jane@example.com");
        assert_eq!(built["tone"], "angry");
        assert_eq!(built["urgency"], "medium");
        assert_eq!(built["priority"], "high");
        assert_eq!(built["session_id"], req.session_id.to_string());
    }

    #[test]
    fn risk_payload_defaults_transaction() {
        let req = request(ActionType::BlockTransaction, Map::new());
        let built = build_payload(TargetSystem::RiskSystem, &req);
        assert_eq!(built["transaction_id"], "unknown");
        assert_eq!(built["requires_investigation"], true);
        assert_eq!(built["action"], "block_transaction");
    }

    #[tokio::test]
    async fn simulated_target_succeeds_with_prefix() {
        let target = SimulatedTarget::new(TargetSystem::ComplianceLog, instant(0.0));
        let response = target.invoke(&Map::new()).await.unwrap();
        assert!(response.reference_id.starts_with("COMP-"));
        assert_eq!(response.details["status"], "under_review");
    }

    #[tokio::test]
    async fn simulated_target_always_failing() {
        let target = SimulatedTarget::new(TargetSystem::Crm, instant(1.0));
        let err = target.invoke(&Map::new()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn simulated_registry_covers_all_systems() {
        let registry = TargetRegistry::simulated(&instant(0.0));
        for system in TargetSystem::ALL {
            let target = registry.get(system).unwrap();
            assert_eq!(target.system(), system);
        }
    }
}
