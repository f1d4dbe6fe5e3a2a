use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("transport setup error: {0}")]
    Setup(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("dial error: {0}")]
    Dial(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}
