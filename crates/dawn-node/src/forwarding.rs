use std::collections::HashMap;

use serde_json::Value;

/// Where a forwarded request's response needs to go: the inbound session
/// it arrived on, and the id the original caller used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnAddress {
    pub inbound_session: String,
    pub inbound_id: Value,
}

/// One in-flight forward: the return address to deliver the reply to, plus
/// the node id the request was sent *to* — the session whose drop should
/// fail this entry, not the inbound one it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlight {
    target_node_id: String,
    addr: ReturnAddress,
}

/// Tracks in-flight forwarded requests so a response arriving on the
/// outbound peer session can be rewritten back to the caller's original
/// id before it is delivered on the inbound session.
#[derive(Default)]
pub struct ForwardingTable {
    next_outbound_id: u64,
    in_flight: HashMap<String, InFlight>,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a forwarded request addressed to `target_node_id`,
    /// returning the new outbound id to use on the wire toward the peer.
    pub fn register(
        &mut self,
        inbound_session: String,
        inbound_id: Value,
        target_node_id: String,
    ) -> String {
        self.next_outbound_id += 1;
        let outbound_id = format!("fwd-{}", self.next_outbound_id);
        self.in_flight.insert(
            outbound_id.clone(),
            InFlight {
                target_node_id,
                addr: ReturnAddress {
                    inbound_session,
                    inbound_id,
                },
            },
        );
        outbound_id
    }

    /// Resolve an outbound id back to its return address, removing the
    /// entry (a response is delivered at most once).
    pub fn resolve(&mut self, outbound_id: &str) -> Option<ReturnAddress> {
        self.in_flight.remove(outbound_id).map(|f| f.addr)
    }

    /// Drop every in-flight entry that was sent *to* `target_node_id`,
    /// returning `(outbound_id, return_address)` pairs so the caller can
    /// be notified with `PeerTransportFailed` and any reply sink keyed by
    /// outbound id can be cleaned up too. Called when a peer session to
    /// that node drops.
    pub fn drain_target(&mut self, target_node_id: &str) -> Vec<(String, ReturnAddress)> {
        let mut drained = Vec::new();
        self.in_flight.retain(|outbound_id, entry| {
            if entry.target_node_id == target_node_id {
                drained.push((outbound_id.clone(), entry.addr.clone()));
                false
            } else {
                true
            }
        });
        drained
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }
}
