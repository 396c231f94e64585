//! Dispatch state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of one action dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    /// Built, not yet attempted.
    Queued,
    /// An attempt is running against the target.
    InProgress,
    /// The target accepted the action.
    Success,
    /// The last attempt failed.
    Failed,
    /// Waiting out the backoff before the next attempt.
    Retrying,
    /// Retry budget exhausted.
    FailedMaxRetries,
}

impl DispatchState {
    pub fn can_transition_to(&self, target: DispatchState) -> bool {
        use DispatchState::*;

        matches!(
            (self, target),
            (Queued, InProgress)
                | (InProgress, Success)
                | (InProgress, Failed)
                | (Failed, Retrying)
                | (Failed, FailedMaxRetries)
                | (Retrying, InProgress)
        )
    }

    /// `Failed` is terminal only when the dispatcher stops there; see
    /// `DispatchTracker::settle`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::FailedMaxRetries)
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
            Self::FailedMaxRetries => "failed_max_retries",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DispatchState,
    pub to: DispatchState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Tracks the state of one dispatch and its transition history.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchTracker {
    pub state: DispatchState,
    pub transitions: Vec<StateTransition>,
    /// Set once the dispatcher stops, including on a permanent `Failed`.
    pub settled: bool,
}

impl Default for DispatchTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchTracker {
    pub fn new() -> Self {
        Self {
            state: DispatchState::Queued,
            transitions: Vec::new(),
            settled: false,
        }
    }

    pub fn transition_to(
        &mut self,
        new_state: DispatchState,
        reason: Option<String>,
    ) -> Result<(), String> {
        if self.settled || !self.state.can_transition_to(new_state) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            ));
        }
        self.transitions.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
            reason,
        });
        self.state = new_state;
        if new_state.is_terminal() {
            self.settled = true;
        }
        Ok(())
    }

    /// Stop in the current state. Used for permanent failures.
    pub fn settle(&mut self) {
        self.settled = true;
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> usize {
        self.transitions
            .iter()
            .filter(|t| t.to == DispatchState::InProgress)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut tracker = DispatchTracker::new();
        tracker.transition_to(DispatchState::InProgress, None).unwrap();
        tracker.transition_to(DispatchState::Success, None).unwrap();
        assert!(tracker.settled);
        assert_eq!(tracker.attempts(), 1);
    }

    #[test]
    fn retry_cycle_then_exhaustion() {
        let mut tracker = DispatchTracker::new();
        tracker.transition_to(DispatchState::InProgress, None).unwrap();
        tracker.transition_to(DispatchState::Failed, None).unwrap();
        tracker.transition_to(DispatchState::Retrying, None).unwrap();
        tracker.transition_to(DispatchState::InProgress, None).unwrap();
        tracker.transition_to(DispatchState::Failed, None).unwrap();
        tracker
            .transition_to(DispatchState::FailedMaxRetries, Some("budget".into()))
            .unwrap();
        assert_eq!(tracker.state, DispatchState::FailedMaxRetries);
        assert_eq!(tracker.attempts(), 2);
        assert!(
            tracker
                .transition_to(DispatchState::Retrying, None)
                .is_err()
        );
    }

    #[test]
    fn invalid_transitions() {
        use DispatchState::*;
        assert!(!Queued.can_transition_to(Success));
        assert!(!Success.can_transition_to(InProgress));
        assert!(!Retrying.can_transition_to(Success));
        assert!(!FailedMaxRetries.can_transition_to(Retrying));
        assert!(!InProgress.can_transition_to(Retrying));
    }

    #[test]
    fn settled_failure_rejects_more_transitions() {
        let mut tracker = DispatchTracker::new();
        tracker.transition_to(DispatchState::InProgress, None).unwrap();
        tracker.transition_to(DispatchState::Failed, None).unwrap();
        tracker.settle();
        assert!(tracker.transition_to(DispatchState::Retrying, None).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(DispatchState::Success.is_terminal());
        assert!(DispatchState::FailedMaxRetries.is_terminal());
        assert!(!DispatchState::Failed.is_terminal());
        assert!(!DispatchState::Retrying.is_terminal());
    }
}
