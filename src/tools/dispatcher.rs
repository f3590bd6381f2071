use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::ToolRegistry;
use crate::events::DispatchEvent;
use crate::types::{Deadline, FailureKind, ToolCallRequest, ToolResult};
use crate::DispatchConfig;

/// Lifecycle of a single call. Terminal states never go back to `Dispatched`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Received,
    Validating,
    Rejected,
    Dispatched,
    Succeeded,
    Failed(FailureKind),
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallState::Rejected | CallState::Succeeded | CallState::Failed(_)
        )
    }

    pub fn can_advance_to(self, next: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Received, Rejected)
                | (Validating, Rejected)
                | (Validating, Dispatched)
                | (Validating, Failed(FailureKind::Cancelled))
                | (Dispatched, Succeeded)
                | (Dispatched, Failed(_))
        )
    }

    fn advance(&mut self, next: CallState) {
        debug_assert!(self.can_advance_to(next), "{self:?} -> {next:?}");
        *self = next;
    }
}

/// Bookkeeping for one worker call, owned by the dispatcher until the
/// result is produced.
#[derive(Debug, Clone)]
pub struct WorkerInvocation {
    pub tool_name: String,
    pub started_at: Instant,
    pub deadline: Deadline,
    pub attempt: u32,
}

impl WorkerInvocation {
    fn start(tool_name: &str, budget: Duration, attempt: u32) -> Self {
        let started_at = Instant::now();
        Self {
            tool_name: tool_name.to_string(),
            started_at,
            deadline: Deadline::at(started_at + budget),
            attempt,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Routes tool calls from the reasoning loop to their handlers.
///
/// Every path ends in a `ToolResult`: unknown tools, invalid arguments,
/// worker failures, timeouts, cancellation and handler panics are all
/// returned as data. The dispatcher never retries on its own.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    config: DispatchConfig,
    events: Option<mpsc::Sender<DispatchEvent>>,
}

impl Dispatcher {
    pub fn new(registry: impl Into<Arc<ToolRegistry>>, config: DispatchConfig) -> Self {
        Self {
            registry: registry.into(),
            config,
            events: None,
        }
    }

    /// Stream dispatch events to `tx`. Events that do not fit are dropped.
    pub fn with_events(mut self, tx: mpsc::Sender<DispatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Validate and run a single tool call.
    pub async fn dispatch(&self, request: &ToolCallRequest) -> ToolResult {
        self.run(request, None).await
    }

    /// Like `dispatch`, but gives up with `Cancelled` as soon as `cancel` fires.
    pub async fn dispatch_with_cancel(
        &self,
        request: &ToolCallRequest,
        cancel: &CancellationToken,
    ) -> ToolResult {
        self.run(request, Some(cancel)).await
    }

    /// Run every call of a turn concurrently. Results come back in request
    /// order; a failing call never affects its siblings.
    pub async fn dispatch_all(
        &self,
        requests: &[ToolCallRequest],
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        join_all(
            requests
                .iter()
                .map(|request| self.dispatch_with_cancel(request, cancel)),
        )
        .await
    }

    /// Tool declarations for the model.
    pub fn declarations(&self) -> Vec<Value> {
        self.registry.declarations()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    async fn run(&self, request: &ToolCallRequest, cancel: Option<&CancellationToken>) -> ToolResult {
        let started = Instant::now();
        self.emit(DispatchEvent::Started {
            call_id: request.id.clone(),
            tool: request.tool_name.clone(),
            attempt: request.attempt,
            at: chrono::Utc::now(),
        });

        let mut state = CallState::Received;
        let result = self.execute(request, cancel, &mut state).await;
        let latency = started.elapsed();
        let latency_ms = latency.as_millis() as u64;

        match result.failure_kind() {
            None => info!(
                tool = %request.tool_name,
                call_id = %request.id,
                attempt = request.attempt,
                outcome = "success",
                state = ?state,
                latency_ms,
                "tool dispatched"
            ),
            Some(kind) => warn!(
                tool = %request.tool_name,
                call_id = %request.id,
                attempt = request.attempt,
                outcome = %kind,
                detail = result.detail().unwrap_or_default(),
                state = ?state,
                latency_ms,
                "tool dispatch failed"
            ),
        }

        self.emit(DispatchEvent::Finished {
            call_id: request.id.clone(),
            tool: request.tool_name.clone(),
            failure: result.failure_kind(),
            latency,
            at: chrono::Utc::now(),
        });

        result
    }

    async fn execute(
        &self,
        request: &ToolCallRequest,
        cancel: Option<&CancellationToken>,
        state: &mut CallState,
    ) -> ToolResult {
        let Some(tool) = self.registry.lookup(&request.tool_name) else {
            state.advance(CallState::Rejected);
            return ToolResult::failure(
                request,
                FailureKind::UnknownTool,
                format!(
                    "unknown tool: {}. Available tools: {}",
                    request.tool_name,
                    self.registry.tool_names().join(", ")
                ),
            );
        };

        state.advance(CallState::Validating);
        let input = match tool.input_schema.validate(&request.arguments) {
            Ok(input) => input,
            Err(e) => {
                state.advance(CallState::Rejected);
                return ToolResult::failure(request, FailureKind::ValidationError, e.to_string());
            }
        };

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            state.advance(CallState::Failed(FailureKind::Cancelled));
            return ToolResult::failure(
                request,
                FailureKind::Cancelled,
                "turn cancelled before dispatch",
            );
        }

        let budget = tool
            .timeout
            .unwrap_or_else(|| self.config.timeout_for(tool.class));
        let invocation = WorkerInvocation::start(&tool.name, budget, request.attempt);
        state.advance(CallState::Dispatched);
        debug!(
            tool = %invocation.tool_name,
            attempt = invocation.attempt,
            budget_ms = budget.as_millis() as u64,
            "invoking handler"
        );

        let handler = tool.handler();
        let call = AssertUnwindSafe(handler.invoke(input, invocation.deadline)).catch_unwind();
        let guarded = tokio::time::timeout_at(invocation.deadline.instant(), call);

        let finished = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                r = guarded => Some(r),
            },
            None => Some(guarded.await),
        };

        let result = match finished {
            None => ToolResult::failure(
                request,
                FailureKind::Cancelled,
                format!("turn cancelled after {:?}", invocation.elapsed()),
            ),
            Some(Err(_elapsed)) => ToolResult::failure(
                request,
                FailureKind::WorkerTimeout,
                format!("{} did not respond within {budget:?}", tool.name),
            ),
            Some(Ok(Err(panic))) => ToolResult::failure(
                request,
                FailureKind::WorkerError,
                format!("handler panicked: {}", panic_message(panic.as_ref())),
            ),
            Some(Ok(Ok(Ok(payload)))) => ToolResult::success(request, payload),
            Some(Ok(Ok(Err(e)))) => ToolResult::failure(request, e.failure_kind(), e.to_string()),
        };

        state.advance(match result.failure_kind() {
            None => CallState::Succeeded,
            Some(kind) => CallState::Failed(kind),
        });
        result
    }

    /// Never waits on the receiver: a full or closed channel drops the event.
    fn emit(&self, event: DispatchEvent) {
        let Some(ref tx) = self.events else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            debug!(reason, "dispatch event dropped");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
