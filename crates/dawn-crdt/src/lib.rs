use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// How long a node's entries survive in the registry after its last
/// contributing contact, before they're dropped entirely. Not part of the
/// CRDT algebra itself — purely a local bookkeeping decision each replica
/// makes independently, the same way a peer registry evicts stale peers
/// without needing the other replicas to agree on when.
pub const DEFAULT_STALE_EVICTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Identifies one `local_add` uniquely across the whole mesh: the node that
/// performed it plus a per-node monotonic counter. Never reused, which is
/// what makes OR-Set merge idempotent — replaying the same add twice (or
/// receiving it via two different gossip paths) inserts the same tag both
/// times, and set union collapses duplicates for free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueTag {
    pub node_id: String,
    pub counter: u64,
}

/// Minimal description of a discoverable agent. Real descriptor fields
/// (capabilities, version, etc.) live in `dawn-agent`; this crate only
/// needs an opaque, cloneable, comparable payload to carry around.
pub type AgentDescriptor = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct Entry {
    tag: UniqueTag,
    // Stored as the serialized form rather than serde_json::Value because
    // Value contains f64 and doesn't implement Eq/Hash.
    descriptor_json: String,
}

impl Entry {
    fn new(tag: UniqueTag, descriptor: &AgentDescriptor) -> Self {
        Self {
            tag,
            descriptor_json: descriptor.to_string(),
        }
    }

    fn descriptor(&self) -> AgentDescriptor {
        serde_json::from_str(&self.descriptor_json).unwrap_or(serde_json::Value::Null)
    }
}

/// A delta or full snapshot of CRDT state, exchanged between nodes as
/// `AnnounceAdd`/`AnnounceRemove` gossip notifications or as a full sync on
/// new session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrdtDelta {
    adds: HashMap<String, Vec<(UniqueTag, String)>>,
    removes: HashSet<UniqueTag>,
}

/// Per-node OR-Set of agent descriptors keyed by agent id. Merge is a
/// plain union over `adds` and `removes` — commutative, associative, and
/// idempotent by construction, so nodes converge regardless of the order
/// or duplication of gossip delivery.
pub struct CrdtState {
    node_id: String,
    counter: u64,
    adds: HashMap<String, HashSet<Entry>>,
    removes: HashSet<UniqueTag>,
    last_seen: HashMap<String, Instant>,
}

impl CrdtState {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            counter: 0,
            adds: HashMap::new(),
            removes: HashSet::new(),
            last_seen: HashMap::new(),
        }
    }

    /// Register a new live entry for `agent_id`, tagged with a fresh
    /// monotonic counter unique to this node.
    pub fn local_add(&mut self, agent_id: impl Into<String>, descriptor: AgentDescriptor) -> UniqueTag {
        let tag = UniqueTag {
            node_id: self.node_id.clone(),
            counter: self.counter,
        };
        self.counter += 1;
        let agent_id = agent_id.into();
        self.adds
            .entry(agent_id)
            .or_default()
            .insert(Entry::new(tag.clone(), &descriptor));
        self.last_seen.insert(self.node_id.clone(), Instant::now());
        tag
    }

    /// Tombstone every currently-live tag for `agent_id`. A concurrent
    /// `local_add` on another node racing this removal is not lost: its
    /// tag is new and was never tombstoned, so the agent reappears once
    /// the add is merged in (standard OR-Set "add wins the race" semantics).
    pub fn local_remove(&mut self, agent_id: &str) {
        if let Some(entries) = self.adds.get(agent_id) {
            for entry in entries {
                if !self.removes.contains(&entry.tag) {
                    self.removes.insert(entry.tag.clone());
                }
            }
        }
    }

    /// Merge another replica's full state or delta into this one.
    pub fn merge(&mut self, other: &CrdtState) {
        for (agent_id, entries) in &other.adds {
            let slot = self.adds.entry(agent_id.clone()).or_default();
            for entry in entries {
                slot.insert(entry.clone());
                self.last_seen
                    .insert(entry.tag.node_id.clone(), Instant::now());
            }
        }
        for tag in &other.removes {
            self.removes.insert(tag.clone());
        }
    }

    /// Apply a wire delta (as exchanged over the gossip protocol).
    pub fn apply(&mut self, delta: &CrdtDelta) {
        for (agent_id, entries) in &delta.adds {
            let slot = self.adds.entry(agent_id.clone()).or_default();
            for (tag, descriptor_json) in entries {
                slot.insert(Entry {
                    tag: tag.clone(),
                    descriptor_json: descriptor_json.clone(),
                });
                self.last_seen
                    .insert(tag.node_id.clone(), Instant::now());
            }
        }
        for tag in &delta.removes {
            self.removes.insert(tag.clone());
        }
    }

    /// Export the full state as a delta, suitable for a new-session full
    /// sync or for merging into another replica built from the wire form.
    pub fn to_delta(&self) -> CrdtDelta {
        CrdtDelta {
            adds: self
                .adds
                .iter()
                .map(|(id, entries)| {
                    (
                        id.clone(),
                        entries
                            .iter()
                            .map(|e| (e.tag.clone(), e.descriptor_json.clone()))
                            .collect(),
                    )
                })
                .collect(),
            removes: self.removes.clone(),
        }
    }

    /// Return the descriptor for `agent_id` if it has at least one live
    /// (non-tombstoned) tag. When multiple live tags exist (concurrent
    /// re-announcements), the one with the highest counter from its
    /// originating node wins — an arbitrary but deterministic tie-break.
    pub fn find_agent(&self, agent_id: &str) -> Option<AgentDescriptor> {
        let entries = self.adds.get(agent_id)?;
        entries
            .iter()
            .filter(|e| !self.removes.contains(&e.tag))
            .max_by_key(|e| e.tag.counter)
            .map(Entry::descriptor)
    }

    /// Which node currently hosts `agent_id`, if any. First-match policy:
    /// when concurrent re-announcements from different nodes race (rare,
    /// since agent ids are normally owned by one node at a time), ties are
    /// broken by lexicographically smallest `node_id` so every replica
    /// that has merged the same set of tags agrees on the answer.
    pub fn find_agent_node(&self, agent_id: &str) -> Option<String> {
        let entries = self.adds.get(agent_id)?;
        entries
            .iter()
            .filter(|e| !self.removes.contains(&e.tag))
            .map(|e| e.tag.node_id.clone())
            .min()
    }

    /// All agent ids with at least one live tag.
    pub fn list_all(&self) -> Vec<String> {
        self.adds
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| !self.removes.contains(&e.tag)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Drop every entry and tombstone originating from nodes not heard
    /// from in over `threshold` (default 24h). Entries from a node that
    /// has never been observed directly (only merged in transitively) are
    /// conservatively kept, since this replica has no local timestamp for
    /// them until its own `last_seen` map is updated by a future merge.
    pub fn evict_stale(&mut self, threshold: Duration) {
        let stale: HashSet<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| seen.elapsed() > threshold)
            .map(|(id, _)| id.clone())
            .collect();
        if stale.is_empty() {
            return;
        }
        for entries in self.adds.values_mut() {
            entries.retain(|e| !stale.contains(&e.tag.node_id));
        }
        self.removes.retain(|t| !stale.contains(&t.node_id));
        self.last_seen.retain(|id, _| !stale.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_add_then_find_agent() {
        let mut state = CrdtState::new("node-a");
        state.local_add("agent-1", json!({"name": "echo"}));
        assert_eq!(state.find_agent("agent-1"), Some(json!({"name": "echo"})));
    }

    #[test]
    fn local_remove_hides_agent() {
        let mut state = CrdtState::new("node-a");
        state.local_add("agent-1", json!({"name": "echo"}));
        state.local_remove("agent-1");
        assert_eq!(state.find_agent("agent-1"), None);
        assert!(!state.list_all().contains(&"agent-1".to_string()));
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = CrdtState::new("node-a");
        a.local_add("agent-1", json!({"v": 1}));
        let mut b = CrdtState::new("node-b");
        b.local_add("agent-2", json!({"v": 2}));

        let mut left = CrdtState::new("node-a");
        left.merge(&a);
        left.merge(&b);

        let mut right = CrdtState::new("node-a");
        right.merge(&b);
        right.merge(&a);

        assert_eq!(left.list_all().len(), right.list_all().len());
        assert_eq!(left.find_agent("agent-1"), right.find_agent("agent-1"));
        assert_eq!(left.find_agent("agent-2"), right.find_agent("agent-2"));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = CrdtState::new("node-a");
        a.local_add("agent-1", json!({"v": 1}));

        let mut dest = CrdtState::new("node-b");
        dest.merge(&a);
        dest.merge(&a);
        dest.merge(&a);

        assert_eq!(dest.list_all().len(), 1);
    }

    #[test]
    fn merge_is_associative() {
        let mut a = CrdtState::new("node-a");
        a.local_add("agent-1", json!(1));
        let mut b = CrdtState::new("node-b");
        b.local_add("agent-2", json!(2));
        let mut c = CrdtState::new("node-c");
        c.local_add("agent-3", json!(3));

        let mut left = CrdtState::new("x");
        left.merge(&a);
        left.merge(&b);
        left.merge(&c);

        let mut bc = CrdtState::new("y");
        bc.merge(&b);
        bc.merge(&c);
        let mut right = CrdtState::new("z");
        right.merge(&a);
        right.merge(&bc);

        let mut left_ids = left.list_all();
        let mut right_ids = right.list_all();
        left_ids.sort();
        right_ids.sort();
        assert_eq!(left_ids, right_ids);
    }

    #[test]
    fn concurrent_add_wins_over_remove() {
        // Node A removes what it knows about agent-1; node B concurrently
        // re-adds it with a fresh tag. After merge, the re-add must survive.
        let mut a = CrdtState::new("node-a");
        a.local_add("agent-1", json!({"gen": 1}));
        a.local_remove("agent-1");

        let mut b = CrdtState::new("node-b");
        b.local_add("agent-1", json!({"gen": 2}));

        let mut merged = CrdtState::new("node-a");
        merged.merge(&a);
        merged.merge(&b);

        assert_eq!(merged.find_agent("agent-1"), Some(json!({"gen": 2})));
    }

    #[test]
    fn find_agent_node_returns_hosting_node() {
        let mut state = CrdtState::new("node-a");
        state.local_add("agent-1", json!({"name": "echo"}));
        assert_eq!(state.find_agent_node("agent-1"), Some("node-a".to_string()));
    }

    #[test]
    fn find_agent_node_ties_break_lexicographically() {
        let mut a = CrdtState::new("node-b");
        a.local_add("agent-1", json!(1));
        let mut b = CrdtState::new("node-a");
        b.local_add("agent-1", json!(2));

        let mut merged = CrdtState::new("node-z");
        merged.merge(&a);
        merged.merge(&b);
        assert_eq!(merged.find_agent_node("agent-1"), Some("node-a".to_string()));
    }

    #[test]
    fn find_agent_node_none_when_removed() {
        let mut state = CrdtState::new("node-a");
        state.local_add("agent-1", json!(1));
        state.local_remove("agent-1");
        assert_eq!(state.find_agent_node("agent-1"), None);
    }

    #[test]
    fn delta_round_trips_through_apply() {
        let mut a = CrdtState::new("node-a");
        a.local_add("agent-1", json!({"v": 1}));
        let delta = a.to_delta();

        let mut b = CrdtState::new("node-b");
        b.apply(&delta);
        assert_eq!(b.find_agent("agent-1"), Some(json!({"v": 1})));
    }

    #[test]
    fn evict_stale_drops_entries_past_threshold() {
        let mut a = CrdtState::new("node-a");
        a.local_add("agent-1", json!({"v": 1}));
        std::thread::sleep(Duration::from_millis(20));
        a.evict_stale(Duration::from_millis(5));
        assert_eq!(a.find_agent("agent-1"), None);
    }
}
