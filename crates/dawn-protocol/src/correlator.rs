use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

use crate::frame::Message;
use crate::ProtocolError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Correlates outbound requests with their eventual response, the same
/// keyed-pending-response idiom used for task/session ids throughout the
/// P2P node's event loop, generalized to a concurrent map so callers don't
/// need to route replies through a single owning task.
#[derive(Default)]
pub struct Correlator {
    pending: DashMap<String, oneshot::Sender<Message>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Allocate a fresh request id and register a waiter for its response.
    /// Returns the id to use in the outgoing `Message::Request` and a
    /// future that resolves when [`Correlator::resolve`] is called with a
    /// matching id, or times out after `timeout` (default 30s).
    pub fn register(&self, timeout: Option<Duration>) -> (Value, PendingResponse<'_>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        (
            Value::String(id.clone()),
            PendingResponse {
                correlator: self,
                id,
                rx,
                timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            },
        )
    }

    /// Deliver a response frame to whichever waiter registered its id.
    /// Returns `true` if a waiter was found (and thus woken).
    pub fn resolve(&self, response: Message) -> bool {
        let Some(id) = response.id().and_then(Value::as_str).map(str::to_owned) else {
            warn!("correlator received a response with a non-string id; dropping");
            return false;
        };
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

pub struct PendingResponse<'a> {
    correlator: &'a Correlator,
    id: String,
    rx: oneshot::Receiver<Message>,
    timeout: Duration,
}

impl PendingResponse<'_> {
    pub async fn wait(self) -> Result<Message, ProtocolError> {
        let PendingResponse {
            correlator,
            id,
            rx,
            timeout,
        } = self;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(ProtocolError::RequestCancelled),
            Err(_) => {
                correlator.pending.remove(&id);
                Err(ProtocolError::RequestTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_matching_request() {
        let correlator = Correlator::new();
        let (id, pending) = correlator.register(None);
        let response = Message::response_ok(id, json!({"ok": true}));
        assert!(correlator.resolve(response.clone()));
        let got = pending.wait().await.unwrap();
        assert_eq!(got.id(), response.id());
    }

    #[tokio::test]
    async fn unmatched_id_does_not_resolve() {
        let correlator = Correlator::new();
        let (_id, _pending) = correlator.register(None);
        let resolved = correlator.resolve(Message::response_ok(json!("not-registered"), json!(1)));
        assert!(!resolved);
    }

    #[tokio::test]
    async fn timeout_clears_pending_entry() {
        let correlator = Correlator::new();
        let (_id, pending) = correlator.register(Some(Duration::from_millis(20)));
        assert_eq!(correlator.pending_count(), 1);
        let result = pending.wait().await;
        assert!(matches!(result, Err(ProtocolError::RequestTimeout)));
        assert_eq!(correlator.pending_count(), 0);
    }
}
