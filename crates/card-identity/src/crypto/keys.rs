//! Ed25519 key pairs backing card public keys.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CardError, Result};

/// An Ed25519 key pair owned by a card holder or by the card service.
///
/// `ed25519_dalek::SigningKey` zeroizes itself on drop; exported private
/// bytes are wrapped in [`Zeroizing`].
pub struct CardKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl CardKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self::from_signing_key(signing_key)
    }

    /// Import a key pair from raw 32-byte private key material.
    pub fn from_private_key_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(
            bytes
                .try_into()
                .map_err(|_| CardError::InvalidKey("private key must be 32 bytes".into()))?,
        );
        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes)))
    }

    /// Import a key pair from base64-encoded private key material.
    pub fn from_private_key_base64(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|e| CardError::InvalidKey(format!("invalid base64 private key: {e}")))?,
        );
        Self::from_private_key_bytes(&bytes)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Export the private key bytes.
    pub fn private_key_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Export the private key as base64.
    pub fn private_key_base64(&self) -> Zeroizing<String> {
        let bytes = self.private_key_bytes();
        Zeroizing::new(STANDARD.encode(&bytes[..]))
    }

    /// Return the public key as base64, the form stored in cards.
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.verifying_key.to_bytes())
    }

    /// Short key identifier: hex of the first 8 bytes of SHA-256(public key).
    pub fn key_id(&self) -> String {
        let hash = Sha256::digest(self.verifying_key.as_bytes());
        hex::encode(&hash[..8])
    }
}

impl std::fmt::Debug for CardKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardKeyPair")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}
