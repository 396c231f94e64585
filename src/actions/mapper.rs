//! Maps an analyzer verdict onto a canonical action and priority.

use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::actions::model::{ActionRequest, ActionType, Priority};
use crate::pipeline::types::{AgentKind, AnalysisResult, SuggestedAction};

/// Canonical action for a suggestion from `agent`.
pub fn action_type_for(agent: AgentKind, suggested: SuggestedAction) -> ActionType {
    use SuggestedAction::*;

    match suggested {
        EscalateToManager | EmergencyResponse => ActionType::EscalateToManager,
        EscalateToCrm | PriorityResponse => ActionType::EscalateToCrm,
        StandardResponse => ActionType::StandardResponse,
        LogAndAcknowledge | LogWarning | LogForAudit => ActionType::LogWarning,
        BlockAndAlert => ActionType::BlockTransaction,
        FlagForReview | FlagForManualReview | ManualReviewRequired => ActionType::FlagForReview,
        EscalateComplianceReview => ActionType::ComplianceAlert,
        ProcessNormally => match agent {
            AgentKind::Pdf => ActionType::ArchiveDocument,
            AgentKind::Email | AgentKind::Json => ActionType::NoAction,
        },
    }
}

/// Priority from risk thresholds; an explicit escalation request forces
/// `High`.
pub fn priority_for(risk_score: f64, requires_escalation: bool) -> Priority {
    if requires_escalation {
        return Priority::High;
    }
    if risk_score >= 0.8 {
        Priority::Critical
    } else if risk_score >= 0.6 {
        Priority::High
    } else if risk_score >= 0.3 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Build the action request for an analysis result.
pub fn map_analysis(session_id: Uuid, analysis: &AnalysisResult, max_retries: u32) -> ActionRequest {
    let action_type = action_type_for(analysis.agent, analysis.suggested_action);
    let priority = priority_for(analysis.risk_score, analysis.requires_escalation);

    let mut payload = analysis.extracted_fields.clone();
    payload.insert("risk_score".into(), json!(analysis.risk_score));
    payload.insert(
        "suggested_action".into(),
        json!(analysis.suggested_action.keyword()),
    );
    payload.insert(
        "requires_escalation".into(),
        json!(analysis.requires_escalation),
    );
    payload.insert(
        "findings".into(),
        Value::Array(
            analysis
                .findings
                .iter()
                .map(|f| json!({"kind": f.kind, "severity": f.severity, "message": f.message}))
                .collect(),
        ),
    );

    debug!(
        session_id = %session_id,
        agent = %analysis.agent,
        action = %action_type,
        priority = %priority,
        "Mapped analysis to action"
    );

    ActionRequest::new(
        session_id,
        action_type,
        priority,
        payload,
        analysis.agent,
        max_retries,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{Finding, FindingKind, Severity};
    use serde_json::Map;

    #[test]
    fn keyword_table() {
        use SuggestedAction::*;
        let cases = [
            (AgentKind::Email, EscalateToManager, ActionType::EscalateToManager),
            (AgentKind::Email, EmergencyResponse, ActionType::EscalateToManager),
            (AgentKind::Email, PriorityResponse, ActionType::EscalateToCrm),
            (AgentKind::Email, LogAndAcknowledge, ActionType::LogWarning),
            (AgentKind::Email, StandardResponse, ActionType::StandardResponse),
            (AgentKind::Json, BlockAndAlert, ActionType::BlockTransaction),
            (AgentKind::Json, ProcessNormally, ActionType::NoAction),
            (AgentKind::Pdf, ProcessNormally, ActionType::ArchiveDocument),
            (AgentKind::Pdf, EscalateComplianceReview, ActionType::ComplianceAlert),
            (AgentKind::Pdf, ManualReviewRequired, ActionType::FlagForReview),
            (AgentKind::Pdf, LogForAudit, ActionType::LogWarning),
        ];
        for (agent, suggested, expected) in cases {
            assert_eq!(action_type_for(agent, suggested), expected, "{suggested}");
        }
    }

    #[test]
    fn priority_thresholds() {
        assert_eq!(priority_for(0.85, false), Priority::Critical);
        assert_eq!(priority_for(0.8, false), Priority::Critical);
        assert_eq!(priority_for(0.6, false), Priority::High);
        assert_eq!(priority_for(0.3, false), Priority::Medium);
        assert_eq!(priority_for(0.29, false), Priority::Low);
    }

    #[test]
    fn escalation_overrides_to_high() {
        assert_eq!(priority_for(0.1, true), Priority::High);
        assert_eq!(priority_for(0.95, true), Priority::High);
    }

    #[test]
    fn request_carries_identity_and_fields() {
        let mut fields = Map::new();
        fields.insert("transaction_id".into(), json!("T1"));
        let analysis = AnalysisResult::new(
            AgentKind::Json,
            fields,
            vec![Finding::new(FindingKind::ValueOutOfRange, Severity::High, "too big")],
            0.6,
            SuggestedAction::FlagForReview,
        );
        let session = Uuid::new_v4();
        let request = map_analysis(session, &analysis, 3);
        assert_eq!(request.session_id, session);
        assert_eq!(request.source_agent, AgentKind::Json);
        assert_eq!(request.action_type, ActionType::FlagForReview);
        assert_eq!(request.priority, Priority::High);
        assert_eq!(request.retry_count, 0);
        assert_eq!(request.max_retries, 3);
        assert_eq!(request.payload["transaction_id"], "T1");
        assert_eq!(request.payload["findings"][0]["kind"], "value_out_of_range");
    }
}
