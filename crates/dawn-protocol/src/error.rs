use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    ParseError(String),

    #[error("request timed out waiting for a response")]
    RequestTimeout,

    #[error("request was cancelled before a response arrived")]
    RequestCancelled,
}
