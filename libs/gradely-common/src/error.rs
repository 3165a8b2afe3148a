use thiserror::Error;

use crate::status::SolutionStatus;

/// Error taxonomy of the grading pipeline.
///
/// Validation failures are local and immediate; transport and timeout
/// failures are absorbed by the dispatcher's retry loop and only escalate
/// to the terminal `missing` status after exhaustion. An unknown tracking
/// handle is logged and dropped by the report path, never surfaced to the
/// grader.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition {
        from: SolutionStatus,
        to: SolutionStatus,
    },

    #[error("grader transport failure: {0}")]
    Transport(String),

    #[error("grading attempt exceeded the hard time limit of {0}s")]
    Timeout(u64),

    #[error("unknown tracking handle: {0}")]
    UnknownTrackingHandle(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl GradingError {
    /// Timeouts count as transport failures for retry accounting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GradingError::Transport(_) | GradingError::Timeout(_))
    }
}

impl From<redis::RedisError> for GradingError {
    fn from(err: redis::RedisError) -> Self {
        GradingError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for GradingError {
    fn from(err: serde_json::Error) -> Self {
        GradingError::Storage(err.to_string())
    }
}
