use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;

/// Exponential-moving-average smoothing factor applied on every
/// success/failure observation: `health = alpha * sample + (1 - alpha) * health`.
const HEALTH_ALPHA: f64 = 0.2;

/// A peer is considered dead once this much time has passed since it was
/// last seen (via a successful contact or an explicit [`PeerRegistry::update`]).
pub const DEFAULT_DEAD_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Default interval between automatic [`PeerRegistry::cleanup_dead`] sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("peer not found: {0}")]
    NotFound(String),
}

/// A peer's connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    Unknown,
    Connecting,
    Connected,
    Failed,
    Dead,
}

/// Capability counts advertised by a peer, summarizing what its local
/// agents expose without carrying the full descriptors (those live in the
/// CRDT). Populated from `node/get_info` responses and gossip announcements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCapabilities {
    pub agents: usize,
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
}

#[derive(Debug, Clone)]
pub struct Peer {
    pub node_id: String,
    pub addresses: Vec<String>,
    pub public_key: Option<Vec<u8>>,
    pub state: PeerState,
    pub health: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub capabilities: PeerCapabilities,
    first_seen: Instant,
    last_seen: Instant,
}

impl Peer {
    fn new(node_id: String, addresses: Vec<String>) -> Self {
        let now = Instant::now();
        Self {
            node_id,
            addresses,
            public_key: None,
            state: PeerState::Unknown,
            health: 1.0,
            success_count: 0,
            failure_count: 0,
            capabilities: PeerCapabilities::default(),
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn first_seen(&self) -> Instant {
        self.first_seen
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }

    /// A peer is alive if it hasn't exceeded the dead threshold since last
    /// contact and hasn't been explicitly marked `Dead`.
    pub fn is_alive(&self, dead_threshold: Duration) -> bool {
        self.state != PeerState::Dead && self.last_seen.elapsed() < dead_threshold
    }
}

#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Added(Peer),
    Removed(String),
    Updated(Peer),
}

struct Inner {
    peers: HashMap<String, Peer>,
}

/// A partial update applied by [`PeerRegistry::update`] — only the fields
/// set to `Some` are mutated, the rest keep the peer's current value.
/// Avoids forcing every caller to know (and repeat) the whole `Peer`
/// shape just to change one field.
#[derive(Debug, Clone, Default)]
pub struct PeerUpdate {
    pub addresses: Option<Vec<String>>,
    pub public_key: Option<Vec<u8>>,
    pub state: Option<PeerState>,
    pub capabilities: Option<PeerCapabilities>,
}

/// Tracks known peers and a rolling health score for each, derived from
/// the outcome of recent contact attempts. Readers take a point-in-time
/// snapshot; mutation happens behind a single mutex, mirroring the
/// lock-guarded roster/bookkeeping sets the P2P node keeps for its own
/// peer-lifecycle state.
pub struct PeerRegistry {
    inner: Mutex<Inner>,
    events: broadcast::Sender<RegistryEvent>,
    dead_threshold: Duration,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::with_dead_threshold(DEFAULT_DEAD_THRESHOLD)
    }

    pub fn with_dead_threshold(dead_threshold: Duration) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Inner {
                peers: HashMap::new(),
            }),
            events,
            dead_threshold,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn add(&self, node_id: impl Into<String>, addresses: Vec<String>) -> Peer {
        let node_id = node_id.into();
        let peer = Peer::new(node_id.clone(), addresses);
        let mut inner = self.inner.lock().unwrap();
        inner.peers.insert(node_id, peer.clone());
        let _ = self.events.send(RegistryEvent::Added(peer.clone()));
        peer
    }

    pub fn get(&self, node_id: &str) -> Option<Peer> {
        self.inner.lock().unwrap().peers.get(node_id).cloned()
    }

    /// Apply a partial update, refreshing `last_seen`. Inserts the peer if
    /// it was not already known. A new address replaces the old one as the
    /// primary; callers that still want the previous address as a fallback
    /// should append rather than replace `addresses`.
    pub fn update(&self, node_id: &str, update: PeerUpdate) -> Peer {
        let mut inner = self.inner.lock().unwrap();
        let peer = inner
            .peers
            .entry(node_id.to_string())
            .or_insert_with(|| Peer::new(node_id.to_string(), Vec::new()));
        if let Some(addresses) = update.addresses {
            peer.addresses = addresses;
        }
        if let Some(public_key) = update.public_key {
            peer.public_key = Some(public_key);
        }
        if let Some(state) = update.state {
            peer.state = state;
        }
        if let Some(capabilities) = update.capabilities {
            peer.capabilities = capabilities;
        }
        peer.last_seen = Instant::now();
        let snapshot = peer.clone();
        let _ = self.events.send(RegistryEvent::Updated(snapshot.clone()));
        snapshot
    }

    pub fn remove(&self, node_id: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .peers
            .remove(node_id)
            .ok_or_else(|| RegistryError::NotFound(node_id.to_string()))?;
        let _ = self
            .events
            .send(RegistryEvent::Removed(node_id.to_string()));
        Ok(())
    }

    pub fn list(&self) -> Vec<Peer> {
        self.inner.lock().unwrap().peers.values().cloned().collect()
    }

    pub fn list_alive(&self) -> Vec<Peer> {
        self.inner
            .lock()
            .unwrap()
            .peers
            .values()
            .filter(|p| p.is_alive(self.dead_threshold))
            .cloned()
            .collect()
    }

    pub fn list_connected(&self) -> Vec<Peer> {
        self.inner
            .lock()
            .unwrap()
            .peers
            .values()
            .filter(|p| p.is_connected())
            .cloned()
            .collect()
    }

    /// Record a successful contact: refreshes `last_seen`, bumps
    /// `success_count`, and nudges `health` toward 1.0 by the EMA
    /// smoothing factor.
    pub fn record_success(&self, node_id: &str) -> Result<(), RegistryError> {
        self.record_observation(node_id, 1.0)
    }

    /// Record a failed contact: refreshes `last_seen`, bumps
    /// `failure_count`, and nudges `health` toward 0.0. Contact is still
    /// "seen" even on failure — a peer that keeps answering, even with
    /// errors, is not the same as a silent one.
    pub fn record_failure(&self, node_id: &str) -> Result<(), RegistryError> {
        self.record_observation(node_id, 0.0)
    }

    fn record_observation(&self, node_id: &str, sample: f64) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().unwrap();
        let peer = inner
            .peers
            .get_mut(node_id)
            .ok_or_else(|| RegistryError::NotFound(node_id.to_string()))?;
        peer.health = (HEALTH_ALPHA * sample + (1.0 - HEALTH_ALPHA) * peer.health).clamp(0.0, 1.0);
        if sample >= 1.0 {
            peer.success_count += 1;
        } else {
            peer.failure_count += 1;
        }
        peer.last_seen = Instant::now();
        let snapshot = peer.clone();
        let _ = self.events.send(RegistryEvent::Updated(snapshot));
        Ok(())
    }

    /// Remove every peer that has exceeded the dead threshold. Returns the
    /// node ids that were evicted.
    pub fn cleanup_dead(&self) -> Vec<String> {
        let mut inner = self.inner.lock().unwrap();
        let dead: Vec<String> = inner
            .peers
            .values()
            .filter(|p| !p.is_alive(self.dead_threshold))
            .map(|p| p.node_id.clone())
            .collect();
        for id in &dead {
            inner.peers.remove(id);
            let _ = self.events.send(RegistryEvent::Removed(id.clone()));
        }
        dead
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
