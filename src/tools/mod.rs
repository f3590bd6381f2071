pub mod builtin;
pub mod dispatcher;
pub mod handler;
pub mod registry;

pub use dispatcher::{CallState, Dispatcher, WorkerInvocation};
pub use handler::{ToolClass, ToolDef, ToolHandler};
pub use registry::ToolRegistry;
