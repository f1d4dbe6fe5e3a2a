//! Wires [`NodeRouter`] to a live libp2p swarm: dials bootstrap peers,
//! drives the event loop, and turns `Forward`s the router produces into
//! outbound `request_response` sends. Inbound requests are answered via
//! `send_response` once the router resolves them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dawn_config::NodeConfig;
use dawn_crdt::CrdtDelta;
use dawn_discovery::{jittered_interval_ms, sample_peers, BootstrapList, PeerInfo, DEFAULT_GOSSIP_SAMPLE};
use dawn_protocol::{Frame, Message};
use dawn_registry::{PeerState, PeerUpdate};
use dawn_transport::{
    build_transport, identity_to_libp2p_keypair, DawnBehaviour, DawnBehaviourEvent, DawnCodec,
};
use futures::StreamExt;
use libp2p::{
    identify,
    request_response::{self, OutboundRequestId},
    swarm::SwarmEvent,
    Multiaddr, PeerId, Swarm,
};
#[cfg(feature = "mdns")]
use libp2p::mdns;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{Forward, NodeRouter, RequestContext};

/// How often the CRDT registry-GC task sweeps for stale node entries.
/// Coarser than the peer-cleanup sweep since `DEFAULT_STALE_EVICTION`
/// itself is 24h — there's no value in checking every minute.
const CRDT_GC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Where a forwarded request's eventual reply must be delivered once
/// [`NodeRouter::resolve_forwarded`] rewrites it back onto the caller's
/// original id: either the still-open inbound libp2p channel (the caller
/// was another node) or a client-attach session's reply sink (the caller
/// was a locally attached WebSocket client).
enum ReplySink {
    Peer(request_response::ResponseChannel<Frame>),
    Client(mpsc::UnboundedSender<Message>),
}

/// A forward submitted by a client-attach session (see [`crate::client`]):
/// the message to send plus where to deliver the resolved reply, since a
/// client session has no libp2p channel of its own to answer on.
pub struct ClientForward {
    pub forward: Forward,
    pub reply_tx: mpsc::UnboundedSender<Message>,
}

/// A `gossip/announce` notification's payload: the sender's own summary
/// plus a bounded random sample of peers it considers alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GossipAnnounce {
    node_id: String,
    addresses: Vec<String>,
    sample: Vec<GossipPeerSummary>,
    crdt: CrdtDelta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GossipPeerSummary {
    node_id: String,
    addresses: Vec<String>,
}

/// Runs a dawn node's swarm to completion (until dialed to shut down).
/// Owns the `Swarm<DawnBehaviour>` and the map of in-flight outbound
/// requests; everything else — dispatch decisions, CRDT state, peer
/// bookkeeping — lives in [`NodeRouter`], which this loop only calls into.
pub struct NodeSwarmDriver {
    router: Arc<NodeRouter>,
    swarm: Swarm<DawnBehaviour>,
    pending_outbound: HashMap<OutboundRequestId, String>,
    pending_replies: HashMap<String, ReplySink>,
    peer_ids: HashMap<String, PeerId>,
    config: NodeConfig,
    client_forwards: mpsc::Receiver<ClientForward>,
}

impl NodeSwarmDriver {
    pub fn new(
        router: Arc<NodeRouter>,
        config: NodeConfig,
        client_forwards: mpsc::Receiver<ClientForward>,
    ) -> Result<Self, crate::RouterError> {
        let keypair = identity_to_libp2p_keypair(router.identity())
            .map_err(|e| crate::RouterError::Transport(e.to_string()))?;
        let local_peer_id = PeerId::from(keypair.public());
        let (transport, relay_client) = build_transport(&keypair, local_peer_id)
            .map_err(|e| crate::RouterError::Transport(e.to_string()))?;
        let behaviour = DawnBehaviour::new(&keypair, relay_client, DawnCodec::default())
            .map_err(|e| crate::RouterError::Transport(e.to_string()))?;
        let swarm = Swarm::new(
            transport,
            behaviour,
            local_peer_id,
            dawn_transport::default_swarm_config(),
        );

        Ok(Self {
            router,
            swarm,
            pending_outbound: HashMap::new(),
            pending_replies: HashMap::new(),
            peer_ids: HashMap::new(),
            config,
            client_forwards,
        })
    }

    /// Start listening, dial the configured bootstrap peers, then run the
    /// event loop until the process is asked to shut down. `shutdown`
    /// resolves the moment the caller wants the node to stop.
    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) -> Result<(), crate::RouterError> {
        let listen_addr: Multiaddr = self
            .config
            .listen_address
            .parse()
            .map_err(|e| crate::RouterError::Transport(format!("bad listen address: {e}")))?;
        self.swarm
            .listen_on(listen_addr)
            .map_err(|e| crate::RouterError::Transport(e.to_string()))?;

        let bootstrap = BootstrapList::new(self.config.bootstrap_peers.clone());
        for addr in bootstrap.due_for_dial() {
            if let Ok(maddr) = addr.parse::<Multiaddr>() {
                if let Err(e) = self.swarm.dial(maddr) {
                    warn!(error = %e, address = %addr, "bootstrap dial failed");
                }
            }
        }

        let mut gossip_tick = tokio::time::interval(Duration::from_millis(jittered_interval_ms(
            self.config.gossip_interval_secs,
        )));
        let mut cleanup_tick = tokio::time::interval(dawn_registry::DEFAULT_CLEANUP_INTERVAL);
        cleanup_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut registry_gc_tick = tokio::time::interval(CRDT_GC_INTERVAL);
        registry_gc_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("node swarm shutting down");
                    return Ok(());
                }
                _ = gossip_tick.tick() => {
                    self.broadcast_gossip();
                }
                _ = cleanup_tick.tick() => {
                    let evicted = self.router.registry().cleanup_dead();
                    if !evicted.is_empty() {
                        debug!(?evicted, "peer cleanup evicted dead peers");
                    }
                    for node_id in evicted {
                        self.peer_ids.remove(&node_id);
                    }
                }
                _ = registry_gc_tick.tick() => {
                    self.router.evict_stale_crdt(dawn_crdt::DEFAULT_STALE_EVICTION);
                }
                Some(client_fwd) = self.client_forwards.recv() => {
                    self.pending_replies.insert(
                        client_fwd.forward.outbound_id.clone(),
                        ReplySink::Client(client_fwd.reply_tx),
                    );
                    self.send_forward(client_fwd.forward);
                }
                event = self.swarm.select_next_some() => {
                    self.handle_event(event).await;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: SwarmEvent<DawnBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "dawn node listening");
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!(%peer_id, "connection established");
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                let node_id = peer_id.to_string();
                debug!(%peer_id, "connection closed");
                let _ = self.router.registry().update(
                    &node_id,
                    PeerUpdate {
                        state: Some(PeerState::Failed),
                        ..Default::default()
                    },
                );
                for (outbound_id, session, reply) in self.router.fail_session(&node_id) {
                    debug!(session = %session, "forwarded request failed: peer session dropped");
                    match self.pending_replies.remove(&outbound_id) {
                        Some(ReplySink::Peer(channel)) => {
                            let _ = self
                                .swarm
                                .behaviour_mut()
                                .frame
                                .send_response(channel, Frame::Single(reply));
                        }
                        Some(ReplySink::Client(tx)) => {
                            let _ = tx.send(reply);
                        }
                        None => {
                            debug!(
                                session = %session,
                                "no reply sink registered for peer-dropped forward"
                            );
                        }
                    }
                    self.pending_outbound.retain(|_, oid| oid != &outbound_id);
                }
            }
            SwarmEvent::Behaviour(DawnBehaviourEvent::Frame(request_response::Event::Message {
                peer,
                message,
                ..
            })) => self.handle_frame_message(peer, message).await,
            SwarmEvent::Behaviour(DawnBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                self.peer_ids.insert(peer_id.to_string(), peer_id);
                let _ = self.router.registry().update(
                    &peer_id.to_string(),
                    PeerUpdate {
                        addresses: Some(info.listen_addrs.iter().map(|a| a.to_string()).collect()),
                        state: Some(PeerState::Connected),
                        ..Default::default()
                    },
                );
            }
            #[cfg(feature = "mdns")]
            SwarmEvent::Behaviour(DawnBehaviourEvent::Mdns(mdns::Event::Discovered(peers)))
                if self.config.discovery_multicast =>
            {
                for (peer_id, addr) in peers {
                    debug!(%peer_id, %addr, "mdns discovered peer");
                    self.peer_ids.insert(peer_id.to_string(), peer_id);
                    self.router.registry().update(
                        &peer_id.to_string(),
                        PeerUpdate {
                            addresses: Some(vec![addr.to_string()]),
                            ..Default::default()
                        },
                    );
                    if let Err(e) = self.swarm.dial(addr) {
                        warn!(error = %e, %peer_id, "mdns dial failed");
                    }
                }
            }
            #[cfg(feature = "mdns")]
            SwarmEvent::Behaviour(DawnBehaviourEvent::Mdns(mdns::Event::Expired(peers)))
                if self.config.discovery_multicast =>
            {
                for (peer_id, _addr) in peers {
                    debug!(%peer_id, "mdns peer expired");
                    let _ = self.router.registry().update(
                        &peer_id.to_string(),
                        PeerUpdate { state: Some(PeerState::Failed), ..Default::default() },
                    );
                }
            }
            _ => {}
        }
    }

    async fn handle_frame_message(
        &mut self,
        peer: PeerId,
        message: request_response::Message<Frame, Frame>,
    ) {
        match message {
            request_response::Message::Request { request, channel, .. } => {
                let node_id = peer.to_string();
                if let Frame::Single(Message::Notification { method, params, .. }) = &request {
                    if method == "gossip/announce" {
                        self.handle_gossip_announce(&node_id, params.clone());
                        let _ = self
                            .swarm
                            .behaviour_mut()
                            .frame
                            .send_response(channel, Frame::Batch(vec![]));
                        return;
                    }
                }
                let (response, forwards) = self
                    .router
                    .dispatch_frame(&node_id, request, RequestContext::default())
                    .await;
                // A request that produced exactly one forward and no direct
                // response is the common single-call case: keep the inbound
                // channel open and answer it once the forward resolves,
                // instead of dropping it unanswered. Forwards mixed into a
                // batch alongside an immediate response are a rarer case
                // this doesn't reassemble; those forwards are sent but the
                // original caller won't see their reply.
                if response.is_none() && forwards.len() == 1 {
                    self.pending_replies.insert(
                        forwards[0].outbound_id.clone(),
                        ReplySink::Peer(channel),
                    );
                } else if let Some(frame) = response {
                    let _ = self.swarm.behaviour_mut().frame.send_response(channel, frame);
                }
                for forward in forwards {
                    self.send_forward(forward);
                }
            }
            request_response::Message::Response { request_id, response } => {
                let Some(outbound_id) = self.pending_outbound.remove(&request_id) else {
                    return;
                };
                let Frame::Single(reply) = response else {
                    return;
                };
                if let Some((session, rewritten)) =
                    self.router.resolve_forwarded(&outbound_id, reply)
                {
                    debug!(session = %session, "forwarded reply resolved");
                    match self.pending_replies.remove(&outbound_id) {
                        Some(ReplySink::Peer(channel)) => {
                            let _ = self
                                .swarm
                                .behaviour_mut()
                                .frame
                                .send_response(channel, Frame::Single(rewritten));
                        }
                        Some(ReplySink::Client(tx)) => {
                            let _ = tx.send(rewritten);
                        }
                        None => {
                            debug!(session = %session, "no reply sink registered for resolved forward");
                        }
                    }
                }
                let _ = self.router.registry().record_success(&peer.to_string());
            }
        }
    }

    fn handle_gossip_announce(&mut self, from_peer: &str, params: Option<serde_json::Value>) {
        let Some(params) = params else { return };
        let announce: GossipAnnounce = match serde_json::from_value(params) {
            Ok(a) => a,
            Err(e) => {
                warn!(peer = %from_peer, error = %e, "malformed gossip/announce payload");
                return;
            }
        };
        let sample: Vec<(String, Vec<String>)> = announce
            .sample
            .into_iter()
            .map(|p| (p.node_id, p.addresses))
            .collect();
        self.router
            .merge_gossip(&announce.node_id, announce.addresses, &sample, &announce.crdt);
        debug!(from = %announce.node_id, sampled = sample.len(), "merged gossip announce");
    }

    fn send_forward(&mut self, forward: Forward) {
        let Some(peer_id) = self.peer_ids.get(&forward.node_id).copied() else {
            warn!(node_id = %forward.node_id, "forward target has no known PeerId");
            return;
        };
        let request_id = self
            .swarm
            .behaviour_mut()
            .frame
            .send_request(&peer_id, Frame::Single(forward.message));
        self.pending_outbound.insert(request_id, forward.outbound_id);
    }

    fn broadcast_gossip(&mut self) {
        let node_id = self.router.node_id();
        let alive: Vec<PeerInfo> = self
            .router
            .registry()
            .list_alive()
            .into_iter()
            .map(|p| PeerInfo {
                node_id: p.node_id,
                addr: p.addresses.first().cloned().unwrap_or_default(),
            })
            .collect();
        let sample = sample_peers(&alive, DEFAULT_GOSSIP_SAMPLE)
            .into_iter()
            .map(|p| GossipPeerSummary {
                node_id: p.node_id,
                addresses: vec![p.addr],
            })
            .collect();
        let announce = GossipAnnounce {
            node_id,
            addresses: vec![self.config.listen_address.clone()],
            sample,
            crdt: self.router.crdt_snapshot(),
        };
        let notification = Message::notification(
            "gossip/announce",
            Some(serde_json::to_value(&announce).unwrap_or(json!({}))),
        );
        for peer_id in self.peer_ids.values().copied().collect::<Vec<_>>() {
            self.swarm
                .behaviour_mut()
                .frame
                .send_request(&peer_id, Frame::Single(notification.clone()));
        }
    }
}

/// Handle to ask a running [`NodeSwarmDriver`] to shut down.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<()>,
}

impl ShutdownHandle {
    pub async fn shutdown(&self) {
        let _ = self.tx.send(()).await;
    }
}

/// Handle client-attach sessions use to ask the swarm driver to actually
/// send a forwarded request out over the mesh (only the driver owns the
/// live `Swarm`).
#[derive(Clone)]
pub struct ForwardHandle {
    tx: mpsc::Sender<ClientForward>,
}

impl ForwardHandle {
    pub async fn send(&self, forward: Forward, reply_tx: mpsc::UnboundedSender<Message>) {
        let _ = self.tx.send(ClientForward { forward, reply_tx }).await;
    }
}

/// Spawn a node's swarm driver on the current tokio runtime, returning a
/// handle that can be used to ask it to shut down and a handle client-attach
/// sessions use to submit forwards.
pub fn spawn(
    router: Arc<NodeRouter>,
    config: NodeConfig,
) -> Result<
    (
        tokio::task::JoinHandle<Result<(), crate::RouterError>>,
        ShutdownHandle,
        ForwardHandle,
    ),
    crate::RouterError,
> {
    let (forward_tx, forward_rx) = mpsc::channel(64);
    let driver = NodeSwarmDriver::new(router, config, forward_rx)?;
    let (tx, rx) = mpsc::channel(1);
    let handle = tokio::spawn(driver.run(rx));
    Ok((handle, ShutdownHandle { tx }, ForwardHandle { tx: forward_tx }))
}
