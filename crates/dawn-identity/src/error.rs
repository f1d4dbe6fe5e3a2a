use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum IdentityError {
    #[error("identity file is corrupt or in an unrecognized format: {0}")]
    IdentityCorrupt(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("decryption failed (wrong key, tampered ciphertext, or stale nonce)")]
    DecryptionFailed,
}

impl From<std::io::Error> for IdentityError {
    fn from(e: std::io::Error) -> Self {
        IdentityError::Io(e.to_string())
    }
}
