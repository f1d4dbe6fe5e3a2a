use std::sync::atomic::{AtomicU64, Ordering};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::IdentityError;

/// Per-direction symmetric keys derived from a raw X25519 shared secret via
/// HKDF-SHA256, with an independent monotonic nonce counter per direction
/// so two peers never reuse a nonce even if they send at different rates.
///
/// `initiator` determines which of the two HKDF-expanded keys is used for
/// sending vs. receiving, so both ends of a session agree on which key
/// encrypts which direction without needing to exchange anything extra.
pub struct SessionKeys {
    send_cipher: ChaCha20Poly1305,
    recv_cipher: ChaCha20Poly1305,
    send_counter: AtomicU64,
    recv_high_watermark: AtomicU64,
}

impl SessionKeys {
    /// Derive session keys from a raw shared secret (the output of
    /// [`crate::NodeIdentity::key_agreement`]).
    pub fn derive(shared_secret: &[u8; 32], initiator: bool) -> Self {
        let hk = Hkdf::<Sha256>::new(None, shared_secret);
        let mut initiator_to_responder = [0u8; 32];
        let mut responder_to_initiator = [0u8; 32];
        hk.expand(b"dawn/session/i2r", &mut initiator_to_responder)
            .expect("32 bytes is a valid HKDF output length");
        hk.expand(b"dawn/session/r2i", &mut responder_to_initiator)
            .expect("32 bytes is a valid HKDF output length");

        let (send_key, recv_key) = if initiator {
            (initiator_to_responder, responder_to_initiator)
        } else {
            (responder_to_initiator, initiator_to_responder)
        };

        Self {
            send_cipher: ChaCha20Poly1305::new(Key::from_slice(&send_key)),
            recv_cipher: ChaCha20Poly1305::new(Key::from_slice(&recv_key)),
            send_counter: AtomicU64::new(0),
            recv_high_watermark: AtomicU64::new(0),
        }
    }

    /// Encrypt `plaintext`, returning `(nonce_counter, ciphertext)`. The
    /// counter must be sent alongside the ciphertext so the receiver can
    /// reconstruct the nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(u64, Vec<u8>), IdentityError> {
        let counter = self.send_counter.fetch_add(1, Ordering::SeqCst);
        let nonce = nonce_from_counter(counter);
        let ciphertext = self
            .send_cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| IdentityError::DecryptionFailed)?;
        Ok((counter, ciphertext))
    }

    /// Decrypt a ciphertext produced by the peer's `encrypt`, given the
    /// nonce counter it was sent with. Rejects any counter at or below the
    /// highest counter already seen, which blocks naive replay.
    pub fn decrypt(&self, counter: u64, ciphertext: &[u8]) -> Result<Vec<u8>, IdentityError> {
        let prev = self.recv_high_watermark.load(Ordering::SeqCst);
        if counter < prev {
            return Err(IdentityError::DecryptionFailed);
        }
        let nonce = nonce_from_counter(counter);
        let plaintext = self
            .recv_cipher
            .decrypt(&nonce, ciphertext)
            .map_err(|_| IdentityError::DecryptionFailed)?;
        self.recv_high_watermark
            .fetch_max(counter + 1, Ordering::SeqCst);
        Ok(plaintext)
    }
}

fn nonce_from_counter(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(&counter.to_be_bytes());
    *Nonce::from_slice(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_between_initiator_and_responder() {
        let secret = [7u8; 32];
        let initiator = SessionKeys::derive(&secret, true);
        let responder = SessionKeys::derive(&secret, false);

        let (ctr, ct) = initiator.encrypt(b"hello responder").unwrap();
        let pt = responder.decrypt(ctr, &ct).unwrap();
        assert_eq!(pt, b"hello responder");
    }

    #[test]
    fn directions_use_different_keys() {
        let secret = [9u8; 32];
        let initiator = SessionKeys::derive(&secret, true);
        let (ctr, ct) = initiator.encrypt(b"ping").unwrap();
        // Decrypting with the same side's recv cipher (which expects the
        // opposite direction's key) must fail.
        assert!(initiator.decrypt(ctr, &ct).is_err());
    }

    #[test]
    fn replayed_counter_is_rejected() {
        let secret = [3u8; 32];
        let initiator = SessionKeys::derive(&secret, true);
        let responder = SessionKeys::derive(&secret, false);

        let (ctr, ct) = initiator.encrypt(b"one").unwrap();
        responder.decrypt(ctr, &ct).unwrap();
        // Same counter again must be rejected as a replay.
        assert!(responder.decrypt(ctr, &ct).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let secret = [5u8; 32];
        let initiator = SessionKeys::derive(&secret, true);
        let responder = SessionKeys::derive(&secret, false);

        let (ctr, mut ct) = initiator.encrypt(b"integrity matters").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(responder.decrypt(ctr, &ct).is_err());
    }
}
