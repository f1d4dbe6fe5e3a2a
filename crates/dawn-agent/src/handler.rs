use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;
use crate::spec::ResourceContent;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, AgentError>;
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self) -> Result<ResourceContent, AgentError>;
}

#[async_trait]
pub trait ChatHandler: Send + Sync {
    async fn message(&self, input: Value) -> Result<Value, AgentError>;
}
