use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum RouterError {
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("peer transport failed: {0}")]
    PeerTransportFailed(String),

    #[error("backpressure: outbound queue full for session {0}")]
    Backpressure(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RouterError {
    fn from(e: std::io::Error) -> Self {
        RouterError::Io(e.to_string())
    }
}
