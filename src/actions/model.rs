//! Action request/result model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::pipeline::types::AgentKind;

/// Canonical downstream effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    EscalateToCrm,
    EscalateToManager,
    ComplianceAlert,
    BlockTransaction,
    FlagForReview,
    LogWarning,
    ArchiveDocument,
    StandardResponse,
    NoAction,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EscalateToCrm => "escalate_to_crm",
            Self::EscalateToManager => "escalate_to_manager",
            Self::ComplianceAlert => "compliance_alert",
            Self::BlockTransaction => "block_transaction",
            Self::FlagForReview => "flag_for_review",
            Self::LogWarning => "log_warning",
            Self::ArchiveDocument => "archive_document",
            Self::StandardResponse => "standard_response",
            Self::NoAction => "no_action",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "escalate_to_crm" => Some(Self::EscalateToCrm),
            "escalate_to_manager" => Some(Self::EscalateToManager),
            "compliance_alert" => Some(Self::ComplianceAlert),
            "block_transaction" => Some(Self::BlockTransaction),
            "flag_for_review" => Some(Self::FlagForReview),
            "log_warning" => Some(Self::LogWarning),
            "archive_document" => Some(Self::ArchiveDocument),
            "standard_response" => Some(Self::StandardResponse),
            "no_action" => Some(Self::NoAction),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to run one action against its target.
///
/// Owned by the dispatcher for one attempt sequence; `retry_count` is bumped
/// in place between attempts and never exceeds `max_retries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub session_id: Uuid,
    pub action_type: ActionType,
    pub priority: Priority,
    /// Whatever the analyzer extracted, plus risk context.
    pub payload: Map<String, Value>,
    pub source_agent: AgentKind,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
}

impl ActionRequest {
    pub fn new(
        session_id: Uuid,
        action_type: ActionType,
        priority: Priority,
        payload: Map<String, Value>,
        source_agent: AgentKind,
        max_retries: u32,
    ) -> Self {
        Self {
            session_id,
            action_type,
            priority,
            payload,
            source_agent,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
        }
    }

    /// Whether another attempt fits in the retry budget.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Payload string field, or `default`.
    pub fn payload_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.payload.get(key).and_then(Value::as_str).unwrap_or(default)
    }
}

/// Outcome status of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Failed,
    Retrying,
    FailedMaxRetries,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
            Self::FailedMaxRetries => "failed_max_retries",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "retrying" => Some(Self::Retrying),
            "failed_max_retries" => Some(Self::FailedMaxRetries),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub message: String,
    /// Set on success when the target issued a reference (ticket id etc).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference_id: Option<String>,
    pub details: Map<String, Value>,
    /// Request retry count when this attempt ran.
    pub retry_count: u32,
    pub execution_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budget() {
        let mut request = ActionRequest::new(
            Uuid::new_v4(),
            ActionType::FlagForReview,
            Priority::High,
            Map::new(),
            AgentKind::Json,
            2,
        );
        assert!(request.can_retry());
        request.retry_count = 2;
        assert!(!request.can_retry());
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn string_forms_round_trip() {
        for t in [
            ActionType::EscalateToCrm,
            ActionType::ComplianceAlert,
            ActionType::NoAction,
        ] {
            assert_eq!(ActionType::from_str_opt(t.as_str()), Some(t));
            assert_eq!(serde_json::to_value(t).unwrap(), t.as_str());
        }
        for s in [
            ActionStatus::Success,
            ActionStatus::Retrying,
            ActionStatus::FailedMaxRetries,
        ] {
            assert_eq!(ActionStatus::from_str_opt(s.as_str()), Some(s));
        }
        assert_eq!(Priority::from_str_opt("critical"), Some(Priority::Critical));
        assert_eq!(Priority::from_str_opt("urgent"), None);
    }

    #[test]
    fn payload_str_default() {
        let mut payload = Map::new();
        payload.insert("sender".into(), Value::from("a@b.com"));
        let request = ActionRequest::new(
            Uuid::new_v4(),
            ActionType::EscalateToCrm,
            Priority::High,
            payload,
            AgentKind::Email,
            3,
        );
        assert_eq!(request.payload_str("sender", "x"), "a@b.com");
        assert_eq!(request.payload_str("tone", "neutral"), "neutral");
    }
}
