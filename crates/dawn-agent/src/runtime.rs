use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::AgentError;
use crate::handler::{ChatHandler, ResourceHandler, ToolHandler};
use crate::spec::{required_fields, PromptSpec, ResourceContent, ResourceSpec, ToolSpec};

struct RegisteredTool {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

struct RegisteredResource {
    spec: ResourceSpec,
    handler: Arc<dyn ResourceHandler>,
}

struct RegisteredPrompt {
    spec: PromptSpec,
    template: String,
}

/// The capability record an agent exposes: four independent tables for
/// tools, resources, prompts, and (optionally) free-form chat — rather
/// than a type hierarchy of agent "kinds". Any agent can mix and match;
/// an agent with no prompts simply has an empty prompt table.
///
/// Mirrors the central tool-registry idiom used for model-facing tool
/// calls, generalized to the other three capability kinds this runtime
/// exposes over the RPC surface.
pub struct AgentRuntime {
    id: String,
    tools: HashMap<String, RegisteredTool>,
    resources: HashMap<String, RegisteredResource>,
    prompts: HashMap<String, RegisteredPrompt>,
    chat: Option<Arc<dyn ChatHandler>>,
}

impl AgentRuntime {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tools: HashMap::new(),
            resources: HashMap::new(),
            prompts: HashMap::new(),
            chat: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn register_tool(&mut self, spec: ToolSpec, handler: impl ToolHandler + 'static) {
        self.tools.insert(
            spec.name.clone(),
            RegisteredTool {
                spec,
                handler: Arc::new(handler),
            },
        );
    }

    pub fn register_resource(&mut self, spec: ResourceSpec, handler: impl ResourceHandler + 'static) {
        self.resources.insert(
            spec.uri.clone(),
            RegisteredResource {
                spec,
                handler: Arc::new(handler),
            },
        );
    }

    pub fn register_prompt(&mut self, spec: PromptSpec, template: impl Into<String>) {
        self.prompts.insert(
            spec.name.clone(),
            RegisteredPrompt {
                spec,
                template: template.into(),
            },
        );
    }

    pub fn set_chat_handler(&mut self, handler: impl ChatHandler + 'static) {
        self.chat = Some(Arc::new(handler));
    }

    pub fn tools_list(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub async fn tools_call(&self, name: &str, args: Value) -> Result<Value, AgentError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        for field in required_fields(&tool.spec.input_schema) {
            if args.get(&field).is_none() {
                return Err(AgentError::InvalidParams(format!(
                    "missing required field: {field}"
                )));
            }
        }

        tool.handler.call(args).await
    }

    pub fn resources_list(&self) -> Vec<ResourceSpec> {
        let mut specs: Vec<ResourceSpec> =
            self.resources.values().map(|r| r.spec.clone()).collect();
        specs.sort_by(|a, b| a.uri.cmp(&b.uri));
        specs
    }

    pub async fn resources_read(&self, uri: &str) -> Result<ResourceContent, AgentError> {
        let resource = self
            .resources
            .get(uri)
            .ok_or_else(|| AgentError::ResourceNotFound(uri.to_string()))?;
        resource.handler.read().await
    }

    pub fn prompts_list(&self) -> Vec<PromptSpec> {
        let mut specs: Vec<PromptSpec> = self.prompts.values().map(|p| p.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Render a prompt template, substituting `{{name}}` placeholders with
    /// the caller-supplied string arguments. Missing required arguments
    /// are rejected; missing optional arguments are left as the literal
    /// placeholder text.
    pub fn prompts_get(&self, name: &str, args: &HashMap<String, String>) -> Result<String, AgentError> {
        let prompt = self
            .prompts
            .get(name)
            .ok_or_else(|| AgentError::PromptNotFound(name.to_string()))?;

        for arg in &prompt.spec.arguments {
            if arg.required && !args.contains_key(&arg.name) {
                return Err(AgentError::InvalidParams(format!(
                    "missing required argument: {}",
                    arg.name
                )));
            }
        }

        let mut rendered = prompt.template.clone();
        for (key, value) in args {
            rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
        }
        Ok(rendered)
    }

    pub async fn chat_message(&self, input: Value) -> Result<Value, AgentError> {
        match &self.chat {
            Some(handler) => handler.message(input).await,
            None => Err(AgentError::MethodNotFound),
        }
    }
}
