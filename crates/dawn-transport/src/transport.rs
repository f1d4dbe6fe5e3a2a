use futures::future;
use libp2p::{
    core::{muxing::StreamMuxerBox, upgrade},
    identity, noise, relay,
    swarm::Config as SwarmConfig,
    tcp, yamux, PeerId, Transport,
};

use crate::error::TransportError;

/// Build the node's transport: TCP direct-dial, OR'd with a relay-client
/// transport so a node behind NAT can still be reached through a relay
/// reservation (libp2p's DCUtR then attempts to upgrade that connection to
/// a direct hole-punched one). Both legs get the same Noise (XX pattern,
/// mutual Ed25519 authentication) and Yamux multiplexing. This crate never
/// implements its own handshake or AEAD framing: libp2p's noise
/// integration already performs exactly the mutual-signature-over-
/// ephemeral-DH exchange this overlay needs, with forward secrecy from the
/// ephemeral keys.
///
/// Returns the boxed transport plus the `relay::client::Behaviour` that
/// must be folded into the node's `NetworkBehaviour` — the transport and
/// behaviour halves of libp2p's relay client are created together and
/// can't be wired up independently.
pub fn build_transport(
    key: &identity::Keypair,
    local_peer_id: PeerId,
) -> Result<
    (
        libp2p::core::transport::Boxed<(PeerId, StreamMuxerBox)>,
        relay::client::Behaviour,
    ),
    TransportError,
> {
    let (relay_transport, relay_client) = relay::client::new(local_peer_id);

    let tcp_transport = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true))
        .upgrade(upgrade::Version::V1)
        .authenticate(noise::Config::new(key).map_err(|e| TransportError::Setup(e.to_string()))?)
        .multiplex(yamux::Config::default())
        .map(|(peer, muxer), _| (peer, StreamMuxerBox::new(muxer)));

    let relayed_transport = relay_transport
        .upgrade(upgrade::Version::V1)
        .authenticate(noise::Config::new(key).map_err(|e| TransportError::Setup(e.to_string()))?)
        .multiplex(yamux::Config::default())
        .map(|(peer, muxer), _| (peer, StreamMuxerBox::new(muxer)));

    let transport = tcp_transport
        .or_transport(relayed_transport)
        .map(|either, _| match either {
            future::Either::Left(v) => v,
            future::Either::Right(v) => v,
        })
        .boxed();

    Ok((transport, relay_client))
}

/// 30s idle timeout, long enough for relay reservations and DCUtR
/// hole-punching to complete without tearing down the connection first.
pub fn default_swarm_config() -> SwarmConfig {
    use std::time::Duration;
    SwarmConfig::with_tokio_executor().with_idle_connection_timeout(Duration::from_secs(30))
}

/// Adapt a [`dawn_identity::NodeIdentity`]'s Ed25519 seed into a
/// `libp2p::identity::Keypair`, so the application-level identity and the
/// transport-level `PeerId` are derived from the same persisted key.
pub fn identity_to_libp2p_keypair(
    identity: &dawn_identity::NodeIdentity,
) -> Result<identity::Keypair, TransportError> {
    let seed = identity.signing_seed();
    identity::Keypair::ed25519_from_bytes(seed)
        .map_err(|e| TransportError::Setup(format!("invalid ed25519 seed: {e}")))
}
