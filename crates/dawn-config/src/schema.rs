use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_listen_address() -> String {
    "/ip4/0.0.0.0/tcp/0".into()
}

fn default_identity_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dawn")
        .join("identity.key")
}

fn default_gossip_interval_secs() -> u64 {
    60
}

fn default_client_attach_address() -> String {
    "127.0.0.1:18790".into()
}

/// Node-level configuration, merged from layered YAML files and then
/// overridden by the `NODE_*` environment variables.
///
/// Field names intentionally mirror the environment variable names
/// (`listen_address` <-> `NODE_LISTEN_ADDRESS`, etc.) so the override step
/// in [`crate::loader::load`] is a flat, predictable mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Multiaddr this node listens on.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Path to the persisted Ed25519 identity key.
    #[serde(default = "default_identity_path")]
    pub identity_path: PathBuf,
    /// Multiaddrs of bootstrap peers, probed on startup.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Enable local-network discovery via mDNS.
    #[serde(default)]
    pub discovery_multicast: bool,
    /// Interval in seconds between gossip announce rounds.
    #[serde(default = "default_gossip_interval_secs")]
    pub gossip_interval_secs: u64,
    /// `host:port` the client-attach WebSocket listener binds to, for
    /// non-P2P clients. Loopback-only by default — exposing it beyond
    /// localhost is a deployment decision, not this crate's default.
    #[serde(default = "default_client_attach_address")]
    pub client_attach_address: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            identity_path: default_identity_path(),
            bootstrap_peers: Vec::new(),
            discovery_multicast: false,
            gossip_interval_secs: default_gossip_interval_secs(),
            client_attach_address: default_client_attach_address(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gossip_interval_is_60() {
        assert_eq!(NodeConfig::default().gossip_interval_secs, 60);
    }

    #[test]
    fn default_discovery_multicast_is_off() {
        assert!(!NodeConfig::default().discovery_multicast);
    }

    #[test]
    fn default_bootstrap_peers_is_empty() {
        assert!(NodeConfig::default().bootstrap_peers.is_empty());
    }

    #[test]
    fn default_client_attach_address_is_loopback() {
        assert_eq!(NodeConfig::default().client_attach_address, "127.0.0.1:18790");
    }

    #[test]
    fn yaml_round_trip() {
        let cfg = NodeConfig {
            listen_address: "/ip4/127.0.0.1/tcp/4001".into(),
            bootstrap_peers: vec!["/ip4/1.2.3.4/tcp/4001/p2p/abc".into()],
            ..NodeConfig::default()
        };
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: NodeConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.listen_address, "/ip4/127.0.0.1/tcp/4001");
        assert_eq!(back.bootstrap_peers.len(), 1);
    }
}
