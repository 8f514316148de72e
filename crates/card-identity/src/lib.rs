//! card-identity: signed identity cards for end-to-end encryption.
//!
//! Provides card filters (accept all, account cards, one device's
//! cards), self-signed cards with per-signature extra fields, a
//! filesystem card directory with rotation history and revocation,
//! local private key storage with password-protected backups, cached
//! lookups, and an account client that registers, rotates and
//! unregisters an identity's cards.

pub mod card;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod filter;
pub mod lookup;
pub mod manager;
pub mod storage;
pub mod time;

// Re-export primary types
pub use card::{Card, CardBuilder, CardId, CardSignature, CardVerification, CardVerifier};
pub use client::CardClient;
pub use config::ClientConfig;
pub use crypto::{CardKeyPair, KdfParams};
pub use error::{CardError, Result};
pub use filter::{
    accept_account, accept_all, accept_device_id, CardFilter, ACCOUNT_CARD_FIELD,
    IDENTITY_ID_FIELD,
};
pub use lookup::{FindUsersResult, LookupManager, LookupResult};
pub use manager::CardManager;
