use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum AgentError {
    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    #[error("unknown resource: {0}")]
    ResourceNotFound(String),

    #[error("unknown prompt: {0}")]
    PromptNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("method not supported by this agent")]
    MethodNotFound,

    #[error("tool execution failed: {0}")]
    Internal(String),
}
