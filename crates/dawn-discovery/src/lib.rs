mod bootstrap;
mod gossip;
mod provider;

pub use bootstrap::BootstrapList;
pub use gossip::{
    jittered_interval_ms, sample_peers, DEFAULT_GOSSIP_INTERVAL_SECS, DEFAULT_GOSSIP_SAMPLE,
    GOSSIP_JITTER_FRACTION,
};
pub use provider::{DiscoveryProvider, InMemoryDiscovery, PeerInfo};
