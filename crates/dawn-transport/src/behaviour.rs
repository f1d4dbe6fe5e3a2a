//! libp2p `NetworkBehaviour` composition for a dawn node: relay, dcutr,
//! identify, autonat, ping, and request-response, carrying generic
//! JSON-RPC `Frame`s instead of task-specific request/response enums.
//! mDNS is feature-gated (`mdns`) and actually activated here, for local
//! multicast peer discovery on a LAN.

use std::time::Duration;

use libp2p::{autonat, dcutr, identify, identity, ping, relay, request_response, PeerId};
use rand::rngs::OsRng;

use crate::codec::{DawnCodec, DAWN_PROTO};

const APP_PROTO: &str = "/dawn/1.0.0";

#[derive(libp2p::swarm::NetworkBehaviour)]
#[behaviour(out_event = "DawnBehaviourEvent")]
pub struct DawnBehaviour {
    pub relay_client: relay::client::Behaviour,
    pub dcutr: dcutr::Behaviour,
    pub identify: identify::Behaviour,
    pub autonat: autonat::v2::client::Behaviour<OsRng>,
    pub ping: ping::Behaviour,
    pub frame: request_response::Behaviour<DawnCodec>,
    #[cfg(feature = "mdns")]
    pub mdns: libp2p::mdns::tokio::Behaviour,
}

#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum DawnBehaviourEvent {
    Relay(relay::client::Event),
    Dcutr(dcutr::Event),
    Identify(identify::Event),
    Autonat(autonat::v2::client::Event),
    Ping(ping::Event),
    Frame(request_response::Event<dawn_protocol::Frame, dawn_protocol::Frame>),
    #[cfg(feature = "mdns")]
    Mdns(libp2p::mdns::Event),
}

impl From<relay::client::Event> for DawnBehaviourEvent {
    fn from(e: relay::client::Event) -> Self {
        DawnBehaviourEvent::Relay(e)
    }
}
impl From<dcutr::Event> for DawnBehaviourEvent {
    fn from(e: dcutr::Event) -> Self {
        DawnBehaviourEvent::Dcutr(e)
    }
}
impl From<identify::Event> for DawnBehaviourEvent {
    fn from(e: identify::Event) -> Self {
        DawnBehaviourEvent::Identify(e)
    }
}
impl From<autonat::v2::client::Event> for DawnBehaviourEvent {
    fn from(e: autonat::v2::client::Event) -> Self {
        DawnBehaviourEvent::Autonat(e)
    }
}
impl From<ping::Event> for DawnBehaviourEvent {
    fn from(e: ping::Event) -> Self {
        DawnBehaviourEvent::Ping(e)
    }
}
impl From<request_response::Event<dawn_protocol::Frame, dawn_protocol::Frame>> for DawnBehaviourEvent {
    fn from(e: request_response::Event<dawn_protocol::Frame, dawn_protocol::Frame>) -> Self {
        DawnBehaviourEvent::Frame(e)
    }
}
#[cfg(feature = "mdns")]
impl From<libp2p::mdns::Event> for DawnBehaviourEvent {
    fn from(e: libp2p::mdns::Event) -> Self {
        DawnBehaviourEvent::Mdns(e)
    }
}

impl DawnBehaviour {
    pub fn new(
        key: &identity::Keypair,
        relay_client: relay::client::Behaviour,
        codec: DawnCodec,
    ) -> std::io::Result<Self> {
        let local_peer_id = PeerId::from(key.public());
        Ok(Self {
            relay_client,
            dcutr: dcutr::Behaviour::new(local_peer_id),
            identify: identify::Behaviour::new(identify::Config::new(
                APP_PROTO.into(),
                key.public(),
            )),
            autonat: autonat::v2::client::Behaviour::new(OsRng, Default::default()),
            ping: ping::Behaviour::new(ping::Config::new().with_interval(Duration::from_secs(15))),
            frame: request_response::Behaviour::with_codec(
                codec,
                [(DAWN_PROTO, request_response::ProtocolSupport::Full)],
                request_response::Config::default().with_request_timeout(Duration::from_secs(60)),
            ),
            #[cfg(feature = "mdns")]
            mdns: libp2p::mdns::tokio::Behaviour::new(
                libp2p::mdns::Config::default(),
                local_peer_id,
            )?,
        })
    }
}
