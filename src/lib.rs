pub mod error;
pub mod events;
pub mod schema;
pub mod tools;
pub mod types;
pub mod workers;

use std::time::Duration;

pub use error::{ConfigError, RegistryError, WorkerError};
pub use events::DispatchEvent;
pub use schema::{FieldSpec, FieldType, InputSchema, ValidatedInput, ValidationError};
pub use tools::builtin::{builtin_registry, execute_code_tool, search_web_tool};
pub use tools::{CallState, Dispatcher, ToolClass, ToolDef, ToolHandler, ToolRegistry};
pub use types::{Deadline, FailureKind, ToolCallRequest, ToolOutcome, ToolResult};
pub use workers::{CodeExecutionWorker, SearchWorker, SubprocessWorker, WorkerEndpoint};

/// Dispatcher configuration: default time budgets per tool class.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub lookup_timeout: Duration,
    pub compute_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(30),
            compute_timeout: Duration::from_secs(120),
        }
    }
}

impl DispatchConfig {
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_compute_timeout(mut self, timeout: Duration) -> Self {
        self.compute_timeout = timeout;
        self
    }

    pub fn timeout_for(&self, class: ToolClass) -> Duration {
        match class {
            ToolClass::Lookup => self.lookup_timeout,
            ToolClass::Compute => self.compute_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_budget_exceeds_lookup_budget() {
        let config = DispatchConfig::default();
        assert!(config.timeout_for(ToolClass::Compute) > config.timeout_for(ToolClass::Lookup));
    }

    #[test]
    fn builders_override_defaults() {
        let config = DispatchConfig::default()
            .with_lookup_timeout(Duration::from_secs(5))
            .with_compute_timeout(Duration::from_secs(60));
        assert_eq!(config.timeout_for(ToolClass::Lookup), Duration::from_secs(5));
        assert_eq!(config.timeout_for(ToolClass::Compute), Duration::from_secs(60));
    }
}
