//! Ed25519 signing and verification over base64 transport.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::{CardError, Result};

/// Sign a message and return the signature as base64.
pub fn sign_to_base64(signing_key: &SigningKey, message: &[u8]) -> String {
    STANDARD.encode(signing_key.sign(message).to_bytes())
}

/// Verify a base64 signature over `message`.
pub fn verify_from_base64(
    verifying_key: &VerifyingKey,
    message: &[u8],
    signature_b64: &str,
) -> Result<()> {
    let sig_bytes = STANDARD
        .decode(signature_b64)
        .map_err(|e| CardError::InvalidKey(format!("invalid base64 signature: {e}")))?;

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| CardError::InvalidKey("signature must be 64 bytes".into()))?;

    verifying_key
        .verify(message, &Signature::from_bytes(&sig_array))
        .map_err(|_| CardError::SignatureInvalid)
}

/// Decode a base64 public key as stored in a card.
pub fn verifying_key_from_base64(public_key_b64: &str) -> Result<VerifyingKey> {
    let bytes = STANDARD
        .decode(public_key_b64)
        .map_err(|e| CardError::InvalidKey(format!("invalid base64 public key: {e}")))?;

    let key_bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CardError::InvalidKey("public key must be 32 bytes".into()))?;

    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CardError::InvalidKey(format!("invalid verifying key: {e}")))
}
