use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::WorkerError;
use crate::schema::{InputSchema, ValidatedInput};
use crate::types::Deadline;

/// A tool's execution handler. Each worker adapter implements this once,
/// whatever its native transport.
///
/// Implementations should stop work when `deadline` passes. The dispatcher
/// enforces the deadline regardless, by dropping the returned future.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, input: ValidatedInput, deadline: Deadline) -> Result<Value, WorkerError>;
}

#[async_trait]
impl<T: ToolHandler + ?Sized> ToolHandler for Arc<T> {
    async fn invoke(&self, input: ValidatedInput, deadline: Deadline) -> Result<Value, WorkerError> {
        (**self).invoke(input, deadline).await
    }
}

/// Selects the default time budget for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolClass {
    /// Quick lookups such as web search.
    #[default]
    Lookup,
    /// Long-running work such as code execution.
    Compute,
}

/// A tool definition: what the model sees plus the handler that runs it.
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
    pub class: ToolClass,
    /// Overrides the class default from `DispatchConfig`.
    pub timeout: Option<Duration>,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            class: ToolClass::default(),
            timeout: None,
            handler: Arc::new(handler),
        }
    }

    pub fn with_class(mut self, class: ToolClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The complete JSON tool declaration (name, description, input_schema)
    /// sent to the model.
    pub fn declaration(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema.to_json_schema(),
        })
    }

    pub(crate) fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

impl std::fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
