use std::collections::VecDeque;

use dawn_protocol::Message;

use crate::error::RouterError;

/// Default bound on a session's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Tags a queued frame so the backpressure policy can tell a best-effort
/// gossip notification apart from a request awaiting a caller response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Gossip,
    Request,
}

/// A single peer session's outbound queue: a bounded FIFO that multiple
/// producer tasks send through, so sends are serialized per the peer's
/// single send half.
pub struct OutboundQueue {
    capacity: usize,
    frames: VecDeque<(FrameKind, Message)>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            frames: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Enqueue a frame. If the queue is full, the oldest gossip frame is
    /// dropped to make room; if no gossip frame can be dropped (the queue
    /// is full of in-flight requests), the push is rejected with
    /// `Backpressure`.
    pub fn push(&mut self, kind: FrameKind, message: Message, session_id: &str) -> Result<(), RouterError> {
        if self.frames.len() >= self.capacity {
            if let Some(pos) = self
                .frames
                .iter()
                .position(|(k, _)| *k == FrameKind::Gossip)
            {
                self.frames.remove(pos);
            } else {
                return Err(RouterError::Backpressure(session_id.to_string()));
            }
        }
        self.frames.push_back((kind, message));
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.frames.pop_front().map(|(_, m)| m)
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
