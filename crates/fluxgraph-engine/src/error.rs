//! Error types for the flow engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The error kinds carried end-to-end from the engine through the run
/// service and out to the HTTP surface. Each variant maps to exactly one
/// recovery path in the error-handling design: `validation`/`cycle` abort
/// before any node runs, `script`/`timeout` fail the run in progress,
/// `cancelled`/`worker_terminated` are cooperative outcomes, not bugs.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("cycle detected: {0}")]
    Cycle(String),

    #[error("script execution failed: {message}")]
    Script {
        message: String,
        kind: String,
        stack: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
    },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("worker terminated")]
    WorkerTerminated,

    #[error("missing input on port '{0}'")]
    MissingInput(String),

    #[error("invalid input type on port '{port}', expected '{expected}'")]
    InvalidInputType { port: String, expected: String },

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// The wire-level `type` tag used in `ExecutionResult` error objects
    /// (§4.3.2) and in the `Run` record's error field.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::Cycle(_) => "cycle",
            EngineError::Script { .. } => "script",
            EngineError::Timeout(_) => "timeout",
            EngineError::Cancelled => "cancelled",
            EngineError::WorkerTerminated => "worker_terminated",
            EngineError::MissingInput(_) => "validation",
            EngineError::InvalidInputType { .. } => "validation",
            EngineError::UnknownNode(_) => "validation",
            EngineError::Serialization(_) => "storage",
            EngineError::Io(_) => "storage",
        }
    }
}

/// Serializable view of an `EngineError`, used as the `ExecutionResult`
/// error payload and stored verbatim on the `Run` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

impl From<&EngineError> for ErrorInfo {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::Script {
                message,
                kind,
                stack,
                line,
                column,
            } => ErrorInfo {
                message: message.clone(),
                kind: kind.clone(),
                stack: stack.clone(),
                line_number: *line,
                column_number: *column,
            },
            other => ErrorInfo {
                message: other.to_string(),
                kind: other.kind_tag().to_string(),
                stack: None,
                line_number: None,
                column_number: None,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_match_error_table() {
        assert_eq!(EngineError::Cancelled.kind_tag(), "cancelled");
        assert_eq!(EngineError::WorkerTerminated.kind_tag(), "worker_terminated");
        assert_eq!(EngineError::Cycle("A -> B -> A".into()).kind_tag(), "cycle");
    }

    #[test]
    fn script_error_preserves_fields_through_error_info() {
        let err = EngineError::Script {
            message: "boom".into(),
            kind: "TypeError".into(),
            stack: Some("at line 3".into()),
            line: Some(3),
            column: Some(7),
        };
        let info = ErrorInfo::from(&err);
        assert_eq!(info.message, "boom");
        assert_eq!(info.kind, "TypeError");
        assert_eq!(info.line_number, Some(3));
    }
}
