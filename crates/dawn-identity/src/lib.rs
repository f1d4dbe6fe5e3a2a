mod crypto;
mod error;
mod identity;

pub use crypto::SessionKeys;
pub use error::IdentityError;
pub use identity::NodeIdentity;

pub use ed25519_dalek::VerifyingKey;
pub use x25519_dalek::PublicKey as X25519PublicKey;
