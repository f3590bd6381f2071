use std::time::Duration;

use crate::types::FailureKind;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
}

/// Failure reported by a worker adapter.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Connectivity or configuration fault: the worker never accepted the request.
    #[error("worker unavailable: {0}")]
    Unavailable(String),
    #[error("worker timed out after {0:?}")]
    Timeout(Duration),
    /// The worker accepted the request and reported a failure.
    #[error("worker failed: {0}")]
    Failed(String),
}

impl WorkerError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            WorkerError::Unavailable(_) => FailureKind::WorkerUnavailable,
            WorkerError::Timeout(_) => FailureKind::WorkerTimeout,
            WorkerError::Failed(_) => FailureKind::WorkerError,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}
