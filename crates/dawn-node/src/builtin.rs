//! The node's built-in agent(s), instantiated at startup and registered
//! both locally and into the CRDT exactly the way a user-registered agent
//! is — so they show up in `node/list_agents` and `tools/list` for mesh
//! peers like any other agent.
//!
//! Domain tools beyond basic mesh coordination are out of scope for this
//! crate; the coordination agent here exposes only a liveness check and a
//! thin read-only snapshot of the peer registry.

use std::sync::Arc;

use async_trait::async_trait;
use dawn_agent::{AgentError, AgentRuntime, ToolHandler, ToolSpec};
use serde_json::{json, Value};

use crate::NodeRouter;

pub const COORDINATION_AGENT_ID: &str = "coordination";

struct PingTool;

#[async_trait]
impl ToolHandler for PingTool {
    async fn call(&self, _args: Value) -> Result<Value, AgentError> {
        Ok(json!({ "pong": true }))
    }
}

struct ListPeersTool {
    router: Arc<NodeRouter>,
}

#[async_trait]
impl ToolHandler for ListPeersTool {
    async fn call(&self, _args: Value) -> Result<Value, AgentError> {
        let peers = self.router.registry().list();
        Ok(json!({
            "peers": peers.iter().map(|p| json!({
                "node_id": p.node_id,
                "addresses": p.addresses,
                "state": format!("{:?}", p.state),
                "health": p.health,
            })).collect::<Vec<_>>(),
        }))
    }
}

/// Build and register the coordination agent on `router`. Called once
/// during node startup, before discovery kicks off.
pub fn register_builtin_agents(router: &Arc<NodeRouter>) {
    let mut agent = AgentRuntime::new(COORDINATION_AGENT_ID);
    agent.register_tool(
        ToolSpec {
            name: "ping".into(),
            description: "Liveness check; always returns {\"pong\": true}.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        PingTool,
    );
    agent.register_tool(
        ToolSpec {
            name: "list_peers".into(),
            description: "List the peers currently known to this node's registry.".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ListPeersTool { router: router.clone() },
    );
    let descriptor = json!({
        "agent_id": COORDINATION_AGENT_ID,
        "name": "Coordination",
    });
    router.register_agent(agent, descriptor);
}
