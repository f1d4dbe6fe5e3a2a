mod error;
mod handler;
mod runtime;
mod spec;

pub use error::AgentError;
pub use handler::{ChatHandler, ResourceHandler, ToolHandler};
pub use runtime::AgentRuntime;
pub use spec::{required_fields, PromptArgSpec, PromptSpec, ResourceContent, ResourceSpec, ToolSpec};
