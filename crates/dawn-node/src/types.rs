use serde::{Deserialize, Serialize};

/// Node-level privacy toggles reported by `node/get_info` and mutated by
/// `node/configure_privacy`. Distinct from `dawn_transport::PrivacyConfig`
/// (which operates in bytes/milliseconds at the codec layer) — this is the
/// coarse on/off shape exposed at the RPC boundary; the router translates
/// it into a `dawn_transport::PrivacyConfig` when applying it to live
/// sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePrivacyConfig {
    #[serde(default)]
    pub onion_routing: bool,
    #[serde(default)]
    pub message_padding: bool,
    #[serde(default)]
    pub timing_obfuscation: bool,
}

/// Thin opaque LLM provider config — a pass-through, not interpreted or
/// validated by the router.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

/// Per-call authorization context. `caller_is_admin` gates
/// `node/create_agent` and other mutating node-level commands; collapsed
/// to a single flag since the router has no multi-role model of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    pub caller_is_admin: bool,
}
