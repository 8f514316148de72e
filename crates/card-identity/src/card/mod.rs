//! Cards: signed identity records.
//!
//! A card is created by [`CardBuilder`], counter-signed by the card
//! service on publish, and checked with [`CardVerifier`].

pub mod builder;
pub mod model;
pub mod verify;

pub use builder::CardBuilder;
pub use model::{
    Card, CardContent, CardId, CardSignature, CARD_VERSION, SELF_SIGNER, SERVICE_SIGNER,
};
pub use verify::{verify_card, CardVerification, CardVerifier, VerifierCredentials};
