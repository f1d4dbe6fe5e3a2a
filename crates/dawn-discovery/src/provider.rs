use std::collections::HashMap;
use std::sync::Mutex;

/// Address a discovered peer can be dialed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub node_id: String,
    pub addr: String,
}

/// A pluggable backing store for peer discovery. All methods are
/// synchronous — implementations backed by a blocking client (a database,
/// a filesystem directory, an external registry service) run fine when
/// called through `tokio::task::spawn_blocking` from the async event loop
/// despite most providers wrapping a blocking client underneath.
pub trait DiscoveryProvider: Send + Sync {
    fn publish_peer(&self, node_id: &str, addr: &str);
    fn fetch_peers(&self) -> Vec<PeerInfo>;
    fn delete_peer(&self, node_id: &str);
}

/// In-memory discovery provider. The default for single-process tests and
/// the reference implementation every other provider is checked against.
#[derive(Default)]
pub struct InMemoryDiscovery {
    peers: Mutex<HashMap<String, String>>,
}

impl InMemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiscoveryProvider for InMemoryDiscovery {
    fn publish_peer(&self, node_id: &str, addr: &str) {
        self.peers
            .lock()
            .unwrap()
            .insert(node_id.to_string(), addr.to_string());
    }

    fn fetch_peers(&self) -> Vec<PeerInfo> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .map(|(node_id, addr)| PeerInfo {
                node_id: node_id.clone(),
                addr: addr.clone(),
            })
            .collect()
    }

    fn delete_peer(&self, node_id: &str) {
        self.peers.lock().unwrap().remove(node_id);
    }
}
