//! `dawn-mcp` — bridges a locally-hosted agent's tool table onto the
//! Model Context Protocol so any MCP-compatible host can call into it
//! over stdio.

pub mod bridge;
pub mod server;

pub use server::DawnMcpServer;

use std::sync::Arc;

use anyhow::Result;
use dawn_agent::AgentRuntime;
use rmcp::ServiceExt;

/// Start an MCP stdio server for `agent`. Blocks until the client
/// disconnects (stdin EOF) or the process is terminated.
pub async fn serve_stdio(agent: Arc<AgentRuntime>) -> Result<()> {
    let server = DawnMcpServer::new(agent);
    let running = server
        .serve((tokio::io::stdin(), tokio::io::stdout()))
        .await
        .map_err(|e| anyhow::anyhow!("MCP server init error: {e}"))?;
    running
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
    Ok(())
}
