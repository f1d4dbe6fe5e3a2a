mod behaviour;
mod codec;
mod error;
mod transport;

pub use behaviour::{DawnBehaviour, DawnBehaviourEvent};
pub use codec::{cbor_decode, cbor_encode, DawnCodec, PrivacyConfig, DAWN_PROTO};
pub use error::TransportError;
pub use transport::{build_transport, default_swarm_config, identity_to_libp2p_keypair};
