use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

/// A tool call as requested by the reasoning loop. Untrusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlates the result with the model's tool-use block.
    #[serde(default = "new_call_id")]
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    /// 1 for the first dispatch; bumped by `retry()`.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

fn new_call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn first_attempt() -> u32 {
    1
}

impl ToolCallRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: new_call_id(),
            tool_name: tool_name.into(),
            arguments,
            attempt: 1,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Same call, next attempt. Retrying is the caller's decision.
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Retry with corrected arguments, e.g. after a validation failure.
    pub fn retry_with(&self, arguments: Value) -> Self {
        Self {
            arguments,
            ..self.retry()
        }
    }
}

/// Why a tool call did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTool,
    ValidationError,
    WorkerUnavailable,
    WorkerTimeout,
    WorkerError,
    /// The surrounding turn was aborted while the call was in flight.
    Cancelled,
}

impl FailureKind {
    /// Whether re-dispatching (possibly with corrected arguments) can help.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::ValidationError | FailureKind::WorkerTimeout | FailureKind::WorkerError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::UnknownTool => "unknown_tool",
            FailureKind::ValidationError => "validation_error",
            FailureKind::WorkerUnavailable => "worker_unavailable",
            FailureKind::WorkerTimeout => "worker_timeout",
            FailureKind::WorkerError => "worker_error",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: Value },
    Failure { reason: FailureKind, detail: String },
}

/// The result of one dispatch. Always returned as data, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(request: &ToolCallRequest, payload: Value) -> Self {
        Self {
            call_id: request.id.clone(),
            tool_name: request.tool_name.clone(),
            outcome: ToolOutcome::Success { payload },
        }
    }

    pub fn failure(
        request: &ToolCallRequest,
        reason: FailureKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            call_id: request.id.clone(),
            tool_name: request.tool_name.clone(),
            outcome: ToolOutcome::Failure {
                reason,
                detail: detail.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            ToolOutcome::Success { payload } => Some(payload),
            ToolOutcome::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { reason, .. } => Some(*reason),
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { detail, .. } => Some(detail),
        }
    }

    /// Label used in logs and events: `success` or the failure kind.
    pub fn outcome_label(&self) -> &'static str {
        self.failure_kind().map_or("success", FailureKind::as_str)
    }

    /// Text and error flag to hand back to the model as a tool-result block.
    pub fn to_model_content(&self) -> (String, bool) {
        match &self.outcome {
            ToolOutcome::Success { payload } => (payload.to_string(), false),
            ToolOutcome::Failure { reason, detail } => (format!("{reason}: {detail}"), true),
        }
    }
}

/// Absolute time bound for a single worker call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }
}
