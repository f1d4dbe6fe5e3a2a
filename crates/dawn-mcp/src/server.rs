//! [`DawnMcpServer`] — the rmcp [`ServerHandler`] implementation that
//! bridges one locally-hosted [`AgentRuntime`] onto the MCP protocol.
//!
//! Stateless: wraps a single handle, implements only `tools/list` and
//! `tools/call`, and leaves the rest of the MCP lifecycle (initialize,
//! shutdown, ping) to rmcp's defaults.

use std::sync::Arc;

use dawn_agent::AgentRuntime;
use rmcp::{
    handler::server::ServerHandler,
    model::{CallToolRequestParams, CallToolResult, ListToolsResult, PaginatedRequestParams, ServerCapabilities, ServerInfo},
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};

use crate::bridge::{result_to_call_result, tool_spec_to_mcp_tool};

#[derive(Clone)]
pub struct DawnMcpServer {
    agent: Arc<AgentRuntime>,
}

impl DawnMcpServer {
    pub fn new(agent: Arc<AgentRuntime>) -> Self {
        Self { agent }
    }
}

impl ServerHandler for DawnMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let agent = self.agent.clone();
        async move {
            let tools = agent.tools_list().into_iter().map(tool_spec_to_mcp_tool).collect();
            Ok(ListToolsResult {
                tools,
                next_cursor: None,
                meta: None,
            })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(|m| serde_json::Value::Object(m.into_iter().collect()))
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let result = self.agent.tools_call(&request.name, args).await;
        Ok(result_to_call_result(result))
    }
}
