//! Error types for docroute.
//!
//! Analyzer and dispatch failures are carried as values inside their result
//! types. The enums here cover the real I/O seams: configuration, the
//! session-trace store, text extraction and external action targets.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Session-trace store errors.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure signal from an external action target.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TargetError {
    /// Transient failure; the dispatcher retries.
    #[error("Target {target} unavailable: {reason}")]
    Unavailable { target: String, reason: String },

    /// Permanent failure; the dispatcher stops immediately.
    #[error("Target {target} rejected the request: {reason}")]
    Rejected { target: String, reason: String },

    /// The attempt exceeded the per-attempt timeout.
    #[error("Target {target} timed out after {timeout:?}")]
    TimedOut { target: String, timeout: Duration },
}

impl TargetError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Text extraction errors (binary document decoding).
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Unsupported document: {0}")]
    Unsupported(String),

    #[error("Document is not valid text: {0}")]
    Decode(String),

    #[error("Document is empty")]
    Empty,
}

/// Pipeline-level errors (task plumbing).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Session task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_is_not_retryable() {
        let err = TargetError::Rejected {
            target: "crm".into(),
            reason: "bad payload".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_errors_are_retryable() {
        let unavailable = TargetError::Unavailable {
            target: "crm".into(),
            reason: "503".into(),
        };
        let timed_out = TargetError::TimedOut {
            target: "crm".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(unavailable.is_retryable());
        assert!(timed_out.is_retryable());
    }

    #[test]
    fn session_not_found_message() {
        let err = TraceError::SessionNotFound {
            session_id: "abc".into(),
        };
        assert_eq!(err.to_string(), "Session not found: abc");
    }
}
