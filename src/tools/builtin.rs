use crate::error::RegistryError;
use crate::schema::{FieldType, InputSchema};
use crate::workers::{CodeExecutionWorker, SearchWorker};

use super::handler::{ToolClass, ToolDef, ToolHandler};
use super::registry::ToolRegistry;

pub const SEARCH_WEB: &str = "searchWeb";
pub const EXECUTE_CODE: &str = "executeCode";

pub fn search_web_schema() -> InputSchema {
    InputSchema::new()
        .required("query", FieldType::String, "The search query")
        .optional(
            "max_results",
            FieldType::Integer,
            "Maximum number of results to return (1-20, default 5; out-of-range values are clamped)",
        )
}

pub fn execute_code_schema() -> InputSchema {
    InputSchema::new()
        .required(
            "task",
            FieldType::String,
            "Description of the task to solve with code",
        )
        .optional(
            "language",
            FieldType::String,
            "Programming language to use (default: python)",
        )
}

/// `searchWeb`: live web lookups. Takes any handler so tests can swap the worker.
pub fn search_web_tool(handler: impl ToolHandler + 'static) -> ToolDef {
    ToolDef::new(
        SEARCH_WEB,
        "Search the web for current information, facts, news, or research. Use this when you need up-to-date information from the internet.",
        search_web_schema(),
        handler,
    )
    .with_class(ToolClass::Lookup)
}

/// `executeCode`: delegated code execution, on the longer compute budget.
pub fn execute_code_tool(handler: impl ToolHandler + 'static) -> ToolDef {
    ToolDef::new(
        EXECUTE_CODE,
        "Execute Python code for calculations, data processing, algorithms, or mathematical computations.",
        execute_code_schema(),
        handler,
    )
    .with_class(ToolClass::Compute)
}

/// Registry with both built-in tools wired to their HTTP workers.
pub fn builtin_registry(
    search: SearchWorker,
    code: CodeExecutionWorker,
) -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::new()
        .with(search_web_tool(search))?
        .with(execute_code_tool(code))
}
