use std::collections::HashMap;
use std::time::{Duration, Instant};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

struct BackoffState {
    next_attempt: Instant,
    current: Duration,
}

/// Tracks a configured list of bootstrap peer addresses and when each is
/// next eligible for a dial attempt, backing off 1s -> 60s (doubling) on
/// repeated failure — the same fetch-then-dial-with-backoff shape the
/// P2P node's relay redial loop uses, generalized from relay addresses to
/// bootstrap peers.
pub struct BootstrapList {
    addrs: Vec<String>,
    backoff: HashMap<String, BackoffState>,
}

impl BootstrapList {
    pub fn new(addrs: Vec<String>) -> Self {
        Self {
            addrs,
            backoff: HashMap::new(),
        }
    }

    pub fn addrs(&self) -> &[String] {
        &self.addrs
    }

    /// Addresses currently eligible for a dial attempt (never tried, or
    /// past their backoff window).
    pub fn due_for_dial(&self) -> Vec<String> {
        let now = Instant::now();
        self.addrs
            .iter()
            .filter(|a| {
                self.backoff
                    .get(*a)
                    .map(|b| now >= b.next_attempt)
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Record a failed dial attempt, doubling that address's backoff up
    /// to `MAX_BACKOFF`.
    pub fn record_failure(&mut self, addr: &str) {
        let state = self.backoff.entry(addr.to_string()).or_insert(BackoffState {
            next_attempt: Instant::now(),
            current: MIN_BACKOFF,
        });
        state.current = (state.current * 2).min(MAX_BACKOFF);
        state.next_attempt = Instant::now() + state.current;
    }

    /// Record a success, resetting the address's backoff to the minimum.
    pub fn record_success(&mut self, addr: &str) {
        self.backoff.remove(addr);
    }
}
