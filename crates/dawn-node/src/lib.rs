//! Top-level node router (C8): the single dispatch point a frame passes
//! through regardless of whether it targets a local agent, the node
//! itself, or needs forwarding across the mesh.
//!
//! Transport and swarm wiring live in [`swarm`]; everything in this module
//! is plain, synchronous-where-possible dispatch logic that can be (and is)
//! exercised without a real libp2p stack.

pub mod builtin;
pub mod client;
mod error;
mod forwarding;
mod session;
pub mod swarm;
pub mod types;

pub use error::RouterError;
pub use forwarding::{ForwardingTable, ReturnAddress};
pub use session::{FrameKind, OutboundQueue, DEFAULT_QUEUE_CAPACITY};
pub use types::{LlmConfig, NodePrivacyConfig, RequestContext};

use std::collections::HashMap;
use std::sync::Mutex;

use dawn_agent::{AgentError, AgentRuntime};
use dawn_crdt::CrdtState;
use dawn_identity::NodeIdentity;
use dawn_protocol::{Frame, JsonRpcError, Message};
use dawn_registry::{Peer, PeerRegistry};
use serde_json::{json, Value};

/// Splits a method name into its addressing scheme:
/// `"<agent_id>/<op>"` for a local agent, `"<node_id>:<agent_id>/<op>"` for
/// a full-mesh address, and anything else (`node/…`, `tools/list`, …) for
/// the node itself.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Address {
    Node,
    LocalAgent { agent_id: String, op: String },
    Remote { node_id: String, agent_id: String, op: String },
}

fn parse_address(method: &str) -> Address {
    if let Some((node_id, rest)) = method.split_once(':') {
        if let Some((agent_id, op)) = rest.split_once('/') {
            return Address::Remote {
                node_id: node_id.to_string(),
                agent_id: agent_id.to_string(),
                op: op.to_string(),
            };
        }
    }
    if method.starts_with("node/")
        || method == "tools/list"
        || method.starts_with("resources/")
        || method.starts_with("prompts/")
        || method.starts_with("llm_")
    {
        return Address::Node;
    }
    if let Some((agent_id, op)) = method.split_once('/') {
        return Address::LocalAgent {
            agent_id: agent_id.to_string(),
            op: op.to_string(),
        };
    }
    Address::Node
}

/// A request forwarded to a remote node, ready for the transport layer to
/// hand off to a peer session. [`NodeRouter::dispatch`] returns this
/// instead of resolving the call itself; the caller (the swarm event loop,
/// or a test harness) is responsible for actually sending it and, when the
/// response arrives, calling [`NodeRouter::resolve_forwarded`].
#[derive(Debug, Clone)]
pub struct Forward {
    pub node_id: String,
    pub outbound_id: String,
    pub message: Message,
}

/// The outcome of dispatching one inbound message.
pub enum Dispatched {
    /// Nothing further to do (a notification was handled, or dropped).
    None,
    /// A response ready to deliver back on the inbound session.
    Response(Message),
    /// The request must be forwarded to a peer; the queue/transport layer
    /// sends `forward.message` and later resolves the reply via
    /// [`NodeRouter::resolve_forwarded`].
    Forward(Forward),
}

/// Owns every piece of node-local state a dispatch decision needs:
/// identity, peer registry, mesh agent directory (CRDT), locally-hosted
/// agents, and in-flight forwarding bookkeeping.
pub struct NodeRouter {
    identity: NodeIdentity,
    registry: PeerRegistry,
    crdt: Mutex<CrdtState>,
    local_agents: Mutex<HashMap<String, AgentRuntime>>,
    forwarding: Mutex<ForwardingTable>,
    privacy: Mutex<NodePrivacyConfig>,
    llm: Mutex<LlmConfig>,
}

impl NodeRouter {
    pub fn new(identity: NodeIdentity, registry: PeerRegistry) -> Self {
        let node_id = identity.node_id();
        Self {
            identity,
            registry,
            crdt: Mutex::new(CrdtState::new(node_id)),
            local_agents: Mutex::new(HashMap::new()),
            forwarding: Mutex::new(ForwardingTable::new()),
            privacy: Mutex::new(NodePrivacyConfig::default()),
            llm: Mutex::new(LlmConfig::default()),
        }
    }

    pub fn node_id(&self) -> String {
        self.identity.node_id()
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Register a locally-hosted agent and announce it into the CRDT so
    /// other nodes learn about it on the next gossip round.
    pub fn register_agent(&self, runtime: AgentRuntime, descriptor: Value) {
        let agent_id = runtime.id().to_string();
        self.crdt.lock().unwrap().local_add(&agent_id, descriptor);
        self.local_agents.lock().unwrap().insert(agent_id, runtime);
    }

    pub fn unregister_agent(&self, agent_id: &str) {
        self.crdt.lock().unwrap().local_remove(agent_id);
        self.local_agents.lock().unwrap().remove(agent_id);
    }

    pub fn local_agent_ids(&self) -> Vec<String> {
        self.local_agents.lock().unwrap().keys().cloned().collect()
    }

    /// Merge a CRDT delta received via gossip or a full sync handshake.
    pub fn merge_crdt(&self, delta: &dawn_crdt::CrdtDelta) {
        self.crdt.lock().unwrap().apply(delta);
    }

    pub fn crdt_snapshot(&self) -> dawn_crdt::CrdtDelta {
        self.crdt.lock().unwrap().to_delta()
    }

    /// Drop CRDT entries from nodes not heard from in over `threshold`
    /// (the default is a 24h eviction window). Meant to be called
    /// periodically by the swarm driver's registry-GC task, not on every
    /// merge.
    pub fn evict_stale_crdt(&self, threshold: std::time::Duration) {
        self.crdt.lock().unwrap().evict_stale(threshold);
    }

    /// Fold a `gossip/announce` notification into local state: record the
    /// sender and whatever peers it sampled into the registry (addresses
    /// only — we don't actually know their connection state from hearsay,
    /// so leave that field alone), and merge the accompanying CRDT delta.
    pub fn merge_gossip(
        &self,
        sender_node_id: &str,
        sender_addresses: Vec<String>,
        sample: &[(String, Vec<String>)],
        delta: &dawn_crdt::CrdtDelta,
    ) {
        let own_id = self.node_id();
        if sender_node_id != own_id {
            self.registry.update(
                sender_node_id,
                dawn_registry::PeerUpdate {
                    addresses: Some(sender_addresses),
                    ..Default::default()
                },
            );
        }
        for (node_id, addresses) in sample {
            if node_id != &own_id {
                self.registry.update(
                    node_id,
                    dawn_registry::PeerUpdate {
                        addresses: Some(addresses.clone()),
                        ..Default::default()
                    },
                );
            }
        }
        self.crdt.lock().unwrap().apply(delta);
    }

    /// Dispatch a single JSON-RPC message arriving on `inbound_session`.
    /// Returns `None` for notifications — notifications never produce a
    /// response.
    pub async fn dispatch(
        &self,
        inbound_session: &str,
        message: Message,
        ctx: RequestContext,
    ) -> Dispatched {
        let id = message.id().cloned();
        let is_notification = matches!(message, Message::Notification { .. });

        let result = self.dispatch_inner(inbound_session, &message, &ctx).await;

        match result {
            Ok(DispatchOutcome::Forward(forward)) => Dispatched::Forward(forward),
            Ok(DispatchOutcome::Result(value)) => {
                if is_notification {
                    Dispatched::None
                } else {
                    Dispatched::Response(Message::response_ok(id.unwrap_or(Value::Null), value))
                }
            }
            Err(err) => {
                if is_notification {
                    // Notifications MUST NOT produce a response, even on error.
                    Dispatched::None
                } else {
                    Dispatched::Response(Message::response_err(id.unwrap_or(Value::Null), err))
                }
            }
        }
    }

    /// Dispatch a full frame (single message or batch). An all-notification
    /// batch produces no response frame at all; a mixed batch produces a
    /// response array containing only the entries that came from
    /// non-notification messages, each id-matched to its request.
    pub async fn dispatch_frame(
        &self,
        inbound_session: &str,
        frame: Frame,
        ctx: RequestContext,
    ) -> (Option<Frame>, Vec<Forward>) {
        match frame {
            Frame::Single(message) => {
                let outcome = self.dispatch(inbound_session, message, ctx).await;
                match outcome {
                    Dispatched::None => (None, Vec::new()),
                    Dispatched::Response(resp) => (Some(Frame::Single(resp)), Vec::new()),
                    Dispatched::Forward(fwd) => (None, vec![fwd]),
                }
            }
            Frame::Batch(messages) => {
                let mut responses = Vec::new();
                let mut forwards = Vec::new();
                for message in messages {
                    let outcome = self.dispatch(inbound_session, message, ctx).await;
                    match outcome {
                        Dispatched::None => {}
                        Dispatched::Response(resp) => responses.push(resp),
                        Dispatched::Forward(fwd) => forwards.push(fwd),
                    }
                }
                if responses.is_empty() {
                    (None, forwards)
                } else {
                    (Some(Frame::Batch(responses)), forwards)
                }
            }
        }
    }

    /// Resolve a reply arriving on a peer session back to the inbound
    /// session/id it was originally forwarded from, rewriting the
    /// message's id in the process.
    pub fn resolve_forwarded(&self, outbound_id: &str, reply: Message) -> Option<(String, Message)> {
        let addr = self.forwarding.lock().unwrap().resolve(outbound_id)?;
        let rewritten = match reply {
            Message::Response { outcome, .. } => Message::Response {
                version: dawn_protocol::JsonRpcVersion,
                id: addr.inbound_id,
                outcome,
            },
            other => other,
        };
        Some((addr.inbound_session, rewritten))
    }

    /// Drop every in-flight forward that was sent *to* `target_node_id`
    /// (the peer whose session just dropped), returning
    /// `(outbound_id, inbound_session, error_response)` triples: the
    /// outbound id so the caller can find (and discard) any reply sink it
    /// keyed by it, and the inbound session/message to actually deliver
    /// the `PeerTransportFailed` error to the original caller.
    pub fn fail_session(&self, target_node_id: &str) -> Vec<(String, String, Message)> {
        self.forwarding
            .lock()
            .unwrap()
            .drain_target(target_node_id)
            .into_iter()
            .map(|(outbound_id, addr)| {
                let err = JsonRpcError::new(
                    JsonRpcError::PEER_TRANSPORT_FAILED,
                    format!("peer session {target_node_id} failed"),
                );
                (
                    outbound_id,
                    addr.inbound_session,
                    Message::response_err(addr.inbound_id, err),
                )
            })
            .collect()
    }

    async fn dispatch_inner(
        &self,
        inbound_session: &str,
        message: &Message,
        ctx: &RequestContext,
    ) -> Result<DispatchOutcome, JsonRpcError> {
        let method = message
            .method()
            .ok_or_else(|| JsonRpcError::invalid_params("response message has no method"))?;
        let params = match message {
            Message::Request { params, .. } | Message::Notification { params, .. } => {
                params.clone().unwrap_or(Value::Null)
            }
            Message::Response { .. } => Value::Null,
        };

        match parse_address(method) {
            Address::Node => self.dispatch_node(method, params, ctx).map(DispatchOutcome::Result),
            Address::LocalAgent { agent_id, op } => self
                .dispatch_local_agent(&agent_id, &op, params)
                .await
                .map(DispatchOutcome::Result),
            Address::Remote { node_id, agent_id, op } if node_id == self.node_id() => {
                // A full-mesh address pointed back at ourselves — dispatch
                // locally instead of "forwarding" to a peer the registry
                // never holds (it never contains the local node, per I1).
                self.dispatch_local_agent(&agent_id, &op, params)
                    .await
                    .map(DispatchOutcome::Result)
            }
            Address::Remote { node_id, agent_id, op } => {
                let id = message.id().cloned().unwrap_or(Value::Null);
                if self.registry.get(&node_id).is_none() {
                    return Err(JsonRpcError::unknown_peer(&node_id));
                }
                let outbound_id = self.forwarding.lock().unwrap().register(
                    inbound_session.to_string(),
                    id,
                    node_id.clone(),
                );
                let inner_method = format!("{agent_id}/{op}");
                let forwarded = Message::request(
                    Value::String(outbound_id.clone()),
                    inner_method,
                    if params.is_null() { None } else { Some(params) },
                );
                Ok(DispatchOutcome::Forward(Forward {
                    node_id,
                    outbound_id,
                    message: forwarded,
                }))
            }
        }
    }

    fn dispatch_node(
        &self,
        method: &str,
        params: Value,
        ctx: &RequestContext,
    ) -> Result<Value, JsonRpcError> {
        match method {
            "node/get_info" => Ok(self.node_get_info()),
            "node/list_peers" => Ok(json!({
                "peers": self.registry.list().iter().map(peer_summary).collect::<Vec<_>>()
            })),
            "node/list_agents" => Ok(json!({ "agents": self.list_agent_descriptors() })),
            "node/create_agent" => {
                if !ctx.caller_is_admin {
                    return Err(JsonRpcError::new(
                        JsonRpcError::INTERNAL_ERROR,
                        "node/create_agent requires an admin capability",
                    ));
                }
                let agent_id = params
                    .get("agent_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| JsonRpcError::invalid_params("missing agent_id"))?
                    .to_string();
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(&agent_id)
                    .to_string();
                let runtime = AgentRuntime::new(agent_id.clone());
                self.register_agent(runtime, json!({ "agent_id": agent_id, "name": name }));
                Ok(json!({ "status": "created", "agent_id": agent_id }))
            }
            "node/configure_privacy" => {
                let config: NodePrivacyConfig = serde_json::from_value(
                    params.get("config").cloned().unwrap_or(Value::Null),
                )
                .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
                *self.privacy.lock().unwrap() = config;
                Ok(json!({ "status": "ok" }))
            }
            "tools/list" => Ok(self.aggregate_tools()),
            "resources/list" => Ok(self.aggregate_resources()),
            "prompts/list" => Ok(self.aggregate_prompts()),
            "llm_get_config" => Ok(serde_json::to_value(&*self.llm.lock().unwrap()).unwrap()),
            "llm_set_config" => {
                let config: LlmConfig = serde_json::from_value(params)
                    .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;
                *self.llm.lock().unwrap() = config;
                Ok(json!({ "status": "ok" }))
            }
            "llm_list_models" => Ok(json!({ "models": [] })),
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    async fn dispatch_local_agent(
        &self,
        agent_id: &str,
        op: &str,
        params: Value,
    ) -> Result<Value, JsonRpcError> {
        // A lock guard can't be held across an `.await`, so the call is
        // cloned out under the lock and the registry entry is consulted
        // again only for synchronous operations.
        match op {
            "tools/list" => {
                let agents = self.local_agents.lock().unwrap();
                let agent = agents
                    .get(agent_id)
                    .ok_or_else(|| JsonRpcError::method_not_found(agent_id))?;
                Ok(json!({ "tools": agent.tools_list() }))
            }
            "resources/list" => {
                let agents = self.local_agents.lock().unwrap();
                let agent = agents
                    .get(agent_id)
                    .ok_or_else(|| JsonRpcError::method_not_found(agent_id))?;
                Ok(json!({ "resources": agent.resources_list() }))
            }
            "prompts/list" => {
                let agents = self.local_agents.lock().unwrap();
                let agent = agents
                    .get(agent_id)
                    .ok_or_else(|| JsonRpcError::method_not_found(agent_id))?;
                Ok(json!({ "prompts": agent.prompts_list() }))
            }
            "prompts/get" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| JsonRpcError::invalid_params("missing name"))?;
                let args: HashMap<String, String> = params
                    .get("arguments")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e: serde_json::Error| JsonRpcError::invalid_params(e.to_string()))?
                    .unwrap_or_default();
                let agents = self.local_agents.lock().unwrap();
                let agent = agents
                    .get(agent_id)
                    .ok_or_else(|| JsonRpcError::method_not_found(agent_id))?;
                let rendered = agent
                    .prompts_get(name, &args)
                    .map_err(agent_error_to_rpc)?;
                Ok(json!({ "messages": [{ "role": "user", "content": rendered }] }))
            }
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| JsonRpcError::invalid_params("missing name"))?
                    .to_string();
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
                // Tool execution is async; resolve the handler's future
                // outside the synchronous registry lock.
                let fut = {
                    let agents = self.local_agents.lock().unwrap();
                    let agent = agents
                        .get(agent_id)
                        .ok_or_else(|| JsonRpcError::method_not_found(agent_id))?;
                    agent.tools_call(&name, arguments)
                };
                let result = fut.await.map_err(agent_error_to_rpc)?;
                Ok(json!({ "content": [result], "is_error": false }))
            }
            "resources/read" => {
                let uri = params
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| JsonRpcError::invalid_params("missing uri"))?
                    .to_string();
                let fut = {
                    let agents = self.local_agents.lock().unwrap();
                    let agent = agents
                        .get(agent_id)
                        .ok_or_else(|| JsonRpcError::method_not_found(agent_id))?;
                    agent.resources_read(&uri)
                };
                let content = fut.await.map_err(agent_error_to_rpc)?;
                Ok(json!({ "contents": [content] }))
            }
            "chat/message" => {
                let message = params.get("message").cloned().unwrap_or(Value::Null);
                let fut = {
                    let agents = self.local_agents.lock().unwrap();
                    let agent = agents
                        .get(agent_id)
                        .ok_or_else(|| JsonRpcError::method_not_found(agent_id))?;
                    agent.chat_message(message)
                };
                let content = fut.await.map_err(agent_error_to_rpc)?;
                Ok(json!({ "agent_id": agent_id, "content": content }))
            }
            other => Err(JsonRpcError::method_not_found(&format!("{agent_id}/{other}"))),
        }
    }

    fn node_get_info(&self) -> Value {
        let privacy = self.privacy.lock().unwrap();
        json!({
            "node_id": self.node_id(),
            "address": Value::Null,
            "peer_count": self.registry.list_connected().len(),
            "agents": self.list_agent_descriptors(),
            "privacy": {
                "onion_routing": privacy.onion_routing,
                "message_padding": privacy.message_padding,
                "timing_obfuscation": privacy.timing_obfuscation,
            },
        })
    }

    fn list_agent_descriptors(&self) -> Vec<Value> {
        let crdt = self.crdt.lock().unwrap();
        crdt.list_all()
            .into_iter()
            .filter_map(|agent_id| crdt.find_agent(&agent_id))
            .collect()
    }

    fn aggregate_tools(&self) -> Value {
        let agents = self.local_agents.lock().unwrap();
        let mut tools = Vec::new();
        for (agent_id, agent) in agents.iter() {
            for spec in agent.tools_list() {
                tools.push(json!({ "agent_id": agent_id, "tool": spec }));
            }
        }
        json!({ "tools": tools })
    }

    fn aggregate_resources(&self) -> Value {
        let agents = self.local_agents.lock().unwrap();
        let mut resources = Vec::new();
        for (agent_id, agent) in agents.iter() {
            for spec in agent.resources_list() {
                resources.push(json!({ "agent_id": agent_id, "resource": spec }));
            }
        }
        json!({ "resources": resources })
    }

    fn aggregate_prompts(&self) -> Value {
        let agents = self.local_agents.lock().unwrap();
        let mut prompts = Vec::new();
        for (agent_id, agent) in agents.iter() {
            for spec in agent.prompts_list() {
                prompts.push(json!({ "agent_id": agent_id, "prompt": spec }));
            }
        }
        json!({ "prompts": prompts })
    }
}

enum DispatchOutcome {
    Result(Value),
    Forward(Forward),
}

fn agent_error_to_rpc(err: AgentError) -> JsonRpcError {
    match err {
        AgentError::ToolNotFound(name) => JsonRpcError::method_not_found(&name),
        AgentError::ResourceNotFound(name) => JsonRpcError::method_not_found(&name),
        AgentError::PromptNotFound(name) => JsonRpcError::method_not_found(&name),
        AgentError::InvalidParams(reason) => JsonRpcError::invalid_params(reason),
        AgentError::MethodNotFound => JsonRpcError::method_not_found("chat/message"),
        AgentError::Internal(reason) => JsonRpcError::internal(reason),
    }
}

/// JSON view of a [`Peer`] for `node/list_peers`. `Peer` itself stays free
/// of a `Serialize` derive since it carries `Instant` timestamps that
/// aren't meaningfully portable off this process.
fn peer_summary(peer: &Peer) -> Value {
    json!({
        "node_id": peer.node_id,
        "addresses": peer.addresses,
        "state": format!("{:?}", peer.state),
        "health": peer.health,
        "success_count": peer.success_count,
        "failure_count": peer.failure_count,
        "capabilities": {
            "agents": peer.capabilities.agents,
            "tools": peer.capabilities.tools,
            "resources": peer.capabilities.resources,
            "prompts": peer.capabilities.prompts,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dawn_agent::ToolSpec;
    use serde_json::json;

    fn router() -> NodeRouter {
        NodeRouter::new(NodeIdentity::new(), PeerRegistry::new())
    }

    #[tokio::test]
    async fn node_get_info_reports_node_id() {
        let r = router();
        let msg = Message::request(json!(1), "node/get_info", None);
        match r.dispatch("s", msg, RequestContext::default()).await {
            Dispatched::Response(Message::Response { outcome, .. }) => match outcome {
                dawn_protocol::ResponseOutcome::Ok { result } => {
                    assert_eq!(result["node_id"], json!(r.node_id()));
                }
                _ => panic!("expected ok"),
            },
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let r = router();
        let msg = Message::notification("node/get_info", None);
        let outcome = r.dispatch("s", msg, RequestContext::default()).await;
        assert!(matches!(outcome, Dispatched::None));
    }

    #[tokio::test]
    async fn unknown_node_method_is_method_not_found() {
        let r = router();
        let msg = Message::request(json!(1), "node/does_not_exist", None);
        match r.dispatch("s", msg, RequestContext::default()).await {
            Dispatched::Response(Message::Response { outcome, .. }) => match outcome {
                dawn_protocol::ResponseOutcome::Err { error } => {
                    assert_eq!(error.code, JsonRpcError::METHOD_NOT_FOUND);
                }
                _ => panic!("expected error"),
            },
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn local_agent_tool_call_dispatches_to_runtime() {
        let r = router();
        let mut runtime = AgentRuntime::new("echo-agent");
        struct Echo;
        #[async_trait::async_trait]
        impl dawn_agent::ToolHandler for Echo {
            async fn call(&self, args: Value) -> Result<Value, AgentError> {
                Ok(args)
            }
        }
        runtime.register_tool(
            ToolSpec {
                name: "echo".into(),
                description: "echo".into(),
                input_schema: json!({"type": "object"}),
            },
            Echo,
        );
        r.register_agent(runtime, json!({"agent_id": "echo-agent"}));

        let msg = Message::request(
            json!(1),
            "echo-agent/tools/call",
            Some(json!({"name": "echo", "arguments": {"x": 1}})),
        );
        match r.dispatch("s", msg, RequestContext::default()).await {
            Dispatched::Response(Message::Response { outcome, .. }) => match outcome {
                dawn_protocol::ResponseOutcome::Ok { result } => {
                    assert_eq!(result["content"][0], json!({"x": 1}));
                }
                _ => panic!("expected ok"),
            },
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn remote_call_to_unknown_peer_is_unknown_peer_error() {
        let r = router();
        let msg = Message::request(json!(1), "other-node:agent-1/tools/list", None);
        match r.dispatch("s", msg, RequestContext::default()).await {
            Dispatched::Response(Message::Response { outcome, .. }) => match outcome {
                dawn_protocol::ResponseOutcome::Err { error } => {
                    assert_eq!(error.code, JsonRpcError::UNKNOWN_PEER);
                }
                _ => panic!("expected error"),
            },
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn remote_call_to_known_peer_yields_forward() {
        let r = router();
        r.registry.add("other-node", vec!["addr".into()]);
        let msg = Message::request(json!(1), "other-node:agent-1/tools/list", None);
        match r.dispatch("s", msg, RequestContext::default()).await {
            Dispatched::Forward(fwd) => {
                assert_eq!(fwd.node_id, "other-node");
                assert_eq!(fwd.message.method(), Some("agent-1/tools/list"));
            }
            _ => panic!("expected forward"),
        }
    }

    #[tokio::test]
    async fn resolve_forwarded_rewrites_id_back_to_caller() {
        let r = router();
        r.registry.add("other-node", vec![]);
        let msg = Message::request(json!(42), "other-node:agent-1/tools/list", None);
        let fwd = match r.dispatch("inbound-1", msg, RequestContext::default()).await {
            Dispatched::Forward(fwd) => fwd,
            _ => panic!("expected forward"),
        };

        let reply = Message::response_ok(
            Value::String(fwd.outbound_id.clone()),
            json!({"tools": []}),
        );
        let (session, rewritten) = r.resolve_forwarded(&fwd.outbound_id, reply).unwrap();
        assert_eq!(session, "inbound-1");
        assert_eq!(rewritten.id(), Some(&json!(42)));
    }

    #[tokio::test]
    async fn create_agent_without_admin_capability_is_rejected() {
        let r = router();
        let msg = Message::request(
            json!(1),
            "node/create_agent",
            Some(json!({"agent_id": "new-agent"})),
        );
        match r.dispatch("s", msg, RequestContext::default()).await {
            Dispatched::Response(Message::Response { outcome, .. }) => {
                assert!(matches!(outcome, dawn_protocol::ResponseOutcome::Err { .. }));
            }
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn create_agent_with_admin_capability_succeeds() {
        let r = router();
        let msg = Message::request(
            json!(1),
            "node/create_agent",
            Some(json!({"agent_id": "new-agent"})),
        );
        let ctx = RequestContext { caller_is_admin: true };
        match r.dispatch("s", msg, ctx).await {
            Dispatched::Response(Message::Response { outcome, .. }) => match outcome {
                dawn_protocol::ResponseOutcome::Ok { result } => {
                    assert_eq!(result["status"], json!("created"));
                }
                _ => panic!("expected ok"),
            },
            _ => panic!("expected response"),
        }
        assert!(r.local_agent_ids().contains(&"new-agent".to_string()));
    }

    #[tokio::test]
    async fn batch_with_mixed_validity_returns_response_for_each_non_notification() {
        let r = router();
        let frame = Frame::Batch(vec![
            Message::request(json!(1), "node/get_info", None),
            Message::request(json!(2), "does/not_exist", None),
            Message::notification("node/get_info", None),
        ]);
        let (response, _forwards) = r.dispatch_frame("s", frame, RequestContext::default()).await;
        match response {
            Some(Frame::Batch(messages)) => assert_eq!(messages.len(), 2),
            _ => panic!("expected a batch response"),
        }
    }

    #[tokio::test]
    async fn all_notification_batch_produces_no_response() {
        let r = router();
        let frame = Frame::Batch(vec![
            Message::notification("node/get_info", None),
            Message::notification("node/get_info", None),
        ]);
        let (response, _forwards) = r.dispatch_frame("s", frame, RequestContext::default()).await;
        assert!(response.is_none());
    }

    #[test]
    fn parse_address_recognizes_remote_scheme() {
        match parse_address("node-x:agent-1/tools/list") {
            Address::Remote { node_id, agent_id, op } => {
                assert_eq!(node_id, "node-x");
                assert_eq!(agent_id, "agent-1");
                assert_eq!(op, "tools/list");
            }
            other => panic!("unexpected address: {other:?}"),
        }
    }

    #[test]
    fn parse_address_recognizes_reserved_node_methods() {
        assert_eq!(parse_address("node/get_info"), Address::Node);
        assert_eq!(parse_address("tools/list"), Address::Node);
        assert_eq!(parse_address("llm_get_config"), Address::Node);
    }

    #[test]
    fn parse_address_recognizes_local_agent() {
        match parse_address("agent-1/tools/list") {
            Address::LocalAgent { agent_id, op } => {
                assert_eq!(agent_id, "agent-1");
                assert_eq!(op, "tools/list");
            }
            other => panic!("unexpected address: {other:?}"),
        }
    }

    #[test]
    fn merge_gossip_records_sender_and_sampled_peers_without_touching_self() {
        let r = router();
        let own_id = r.node_id();
        let sender = router();
        let delta = sender.crdt_snapshot();

        r.merge_gossip(
            &sender.node_id(),
            vec!["/ip4/10.0.0.5/tcp/4001".into()],
            &[
                ("peer-far".into(), vec!["/ip4/10.0.0.9/tcp/4001".into()]),
                (own_id.clone(), vec!["/ip4/127.0.0.1/tcp/1".into()]),
            ],
            &delta,
        );

        assert!(r.registry().get(&sender.node_id()).is_some());
        assert!(r.registry().get("peer-far").is_some());
        assert!(r.registry().get(&own_id).is_none(), "must not record itself as a peer");
    }

    #[tokio::test]
    async fn merge_gossip_folds_in_the_crdt_delta() {
        let r = router();
        let sender = router();
        sender.register_agent(AgentRuntime::new("remote-agent"), json!({"agent_id": "remote-agent"}));

        r.merge_gossip(&sender.node_id(), vec![], &[], &sender.crdt_snapshot());

        let outcome = r
            .dispatch("s", Message::request(json!(1), "node/list_agents", None), RequestContext::default())
            .await;
        match outcome {
            Dispatched::Response(Message::Response { outcome: dawn_protocol::ResponseOutcome::Ok { result }, .. }) => {
                let ids: Vec<_> = result["agents"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|a| a["agent_id"].as_str().unwrap().to_string())
                    .collect();
                assert!(ids.contains(&"remote-agent".to_string()));
            }
            _ => panic!("expected ok"),
        }
    }
}
