use std::fs;
use std::path::Path;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret as X25519Secret};

use crate::error::IdentityError;

const SEED_LEN: usize = 32;

/// A node's cryptographic identity: one Ed25519 keypair used both for
/// message signing and (via a deterministic derivation) X25519 key
/// agreement, so a single persisted 32-byte seed is the only secret that
/// needs to survive a restart.
///
/// Persistence follows the same discipline as a libp2p keypair file: an
/// unrecognized or corrupt file is never silently replaced with a fresh
/// identity, because that would change the node's public identity without
/// anyone noticing, breaking every peer that already trusts the old key.
pub struct NodeIdentity {
    signing_key: SigningKey,
    x25519_secret: X25519Secret,
}

impl NodeIdentity {
    /// Generate a fresh random identity. Does not touch disk.
    pub fn new() -> Self {
        let mut seed = [0u8; SEED_LEN];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    fn from_seed(seed: [u8; SEED_LEN]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let x25519_secret = derive_x25519_secret(&seed);
        Self {
            signing_key,
            x25519_secret,
        }
    }

    /// Load the identity persisted at `path`, or generate and persist a new
    /// one if no file exists yet.
    ///
    /// A file that exists but is not exactly 32 bytes is treated as
    /// corrupt and rejected rather than overwritten.
    pub fn load_or_create(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            let raw = fs::read(path)?;
            if raw.len() != SEED_LEN {
                return Err(IdentityError::IdentityCorrupt(format!(
                    "identity file '{}' is {} bytes, expected {SEED_LEN}; delete it to \
                     generate a new identity",
                    path.display(),
                    raw.len()
                )));
            }
            let mut seed = [0u8; SEED_LEN];
            seed.copy_from_slice(&raw);
            return Ok(Self::from_seed(seed));
        }

        let identity = Self::new();
        identity.save(path)?;
        tracing::info!(path = %path.display(), "generated new node identity");
        Ok(identity)
    }

    /// Persist the identity's seed to `path`, creating parent directories
    /// as needed.
    pub fn save(&self, path: &Path) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.signing_key.to_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms)?;
        }
        Ok(())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The raw 32-byte Ed25519 seed backing this identity. Exposed so
    /// adapter crates (e.g. `dawn-transport`, wiring this into a
    /// `libp2p::identity::Keypair`) can derive their own representation
    /// from the same key material instead of holding a second identity.
    pub fn signing_seed(&self) -> [u8; SEED_LEN] {
        self.signing_key.to_bytes()
    }

    pub fn x25519_public(&self) -> X25519Public {
        X25519Public::from(&self.x25519_secret)
    }

    /// Node id: the verifying key's canonical 32-byte form, hex-encoded.
    pub fn node_id(&self) -> String {
        hex::encode(self.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    pub fn verify(
        verifying_key: &VerifyingKey,
        message: &[u8],
        signature: &[u8; 64],
    ) -> Result<(), IdentityError> {
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| IdentityError::SignatureInvalid)
    }

    /// Perform X25519 Diffie-Hellman with a peer's public key, returning a
    /// raw shared secret. Callers must run this through HKDF before use as
    /// an AEAD key — see [`crate::crypto::SessionKeys::derive`].
    pub fn key_agreement(&self, peer_x25519_public: &X25519Public) -> [u8; 32] {
        self.x25519_secret
            .diffie_hellman(peer_x25519_public)
            .to_bytes()
    }
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministically derive an X25519 static secret from an Ed25519 seed,
/// the same way libsodium's `crypto_sign_ed25519_sk_to_curve25519` does:
/// hash the seed and clamp the first 32 bytes. `x25519_dalek::StaticSecret`
/// performs the clamping itself on construction.
fn derive_x25519_secret(seed: &[u8; SEED_LEN]) -> X25519Secret {
    let digest = Sha512::digest(seed);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest[..32]);
    X25519Secret::from(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let id = NodeIdentity::new();
        let sig = id.sign(b"hello");
        assert!(NodeIdentity::verify(&id.verifying_key(), b"hello", &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let id = NodeIdentity::new();
        let sig = id.sign(b"hello");
        assert!(NodeIdentity::verify(&id.verifying_key(), b"goodbye", &sig).is_err());
    }

    #[test]
    fn key_agreement_is_symmetric() {
        let a = NodeIdentity::new();
        let b = NodeIdentity::new();
        let shared_a = a.key_agreement(&b.x25519_public());
        let shared_b = b.key_agreement(&a.x25519_public());
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn load_or_create_persists_and_reloads_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");
        let first = NodeIdentity::load_or_create(&path).unwrap();
        let second = NodeIdentity::load_or_create(&path).unwrap();
        assert_eq!(first.node_id(), second.node_id());
    }

    #[test]
    fn load_or_create_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");
        std::fs::write(&path, b"not a valid seed").unwrap();
        let result = NodeIdentity::load_or_create(&path);
        assert!(result.is_err());
    }

    #[test]
    fn node_id_is_stable_for_same_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.key");
        let id = NodeIdentity::load_or_create(&path).unwrap();
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw.len(), 32);
        drop(id);
        let reloaded = NodeIdentity::load_or_create(&path).unwrap();
        assert_eq!(raw, std::fs::read(&path).unwrap());
        let _ = reloaded.node_id();
    }
}
