//! Cryptographic primitives for cards.
//!
//! Cards are signed with Ed25519. Keys and signatures travel as
//! standard base64 strings. Private key backups are encrypted with
//! ChaCha20-Poly1305 under an Argon2id password key.

pub mod encryption;
pub mod keys;
pub mod signing;

pub use encryption::KdfParams;
pub use keys::CardKeyPair;
