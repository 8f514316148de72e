//! Card verification.

use crate::crypto::signing;
use crate::error::{CardError, Result};

use super::model::{Card, CardContent, CardId};

/// A signer whose signature a [`CardVerifier`] requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierCredentials {
    pub signer: String,
    /// Base64 Ed25519 public key of the signer.
    pub public_key: String,
}

/// Result of verifying a card.
#[derive(Debug, Clone)]
pub struct CardVerification {
    /// The ID is the hash of the content snapshot.
    pub id_valid: bool,
    /// The content snapshot decodes to the card's own fields.
    pub content_valid: bool,
    pub self_signature_valid: bool,
    /// One entry per whitelisted signer, in whitelist order.
    pub signers_valid: Vec<(String, bool)>,
    pub is_valid: bool,
    pub verified_at: u64,
}

impl CardVerification {
    /// Describe the first failed check, if any.
    pub fn failure(&self) -> Option<String> {
        if !self.id_valid {
            return Some("card id does not match content snapshot".into());
        }
        if !self.content_valid {
            return Some("content snapshot does not match card fields".into());
        }
        if !self.self_signature_valid {
            return Some("self signature missing or invalid".into());
        }
        self.signers_valid
            .iter()
            .find(|(_, ok)| !ok)
            .map(|(signer, _)| format!("{signer} signature missing or invalid"))
    }
}

/// Verifies the self signature and a whitelist of additional signers.
#[derive(Debug, Clone, Default)]
pub struct CardVerifier {
    whitelist: Vec<VerifierCredentials>,
}

impl CardVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a valid signature from `signer` under `public_key`.
    pub fn with_signer(mut self, signer: impl Into<String>, public_key: impl Into<String>) -> Self {
        self.whitelist.push(VerifierCredentials {
            signer: signer.into(),
            public_key: public_key.into(),
        });
        self
    }

    pub fn whitelist(&self) -> &[VerifierCredentials] {
        &self.whitelist
    }

    /// Run every check and report each outcome.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidKey` if the card's public key or a
    /// whitelisted key cannot be decoded.
    pub fn verify(&self, card: &Card) -> Result<CardVerification> {
        let now = crate::time::now_secs();
        let card_key = card.verifying_key()?;

        let snapshot = card.snapshot_bytes().ok();
        let id_valid = snapshot
            .as_deref()
            .map(|s| CardId::from_snapshot(s) == card.id)
            .unwrap_or(false);
        let content_valid = snapshot
            .as_deref()
            .and_then(|s| serde_json::from_slice::<CardContent>(s).ok())
            .map(|content| content == card.content())
            .unwrap_or(false);

        let self_signature_valid = match card.self_signature() {
            Some(sig) => card
                .signed_message(&sig.extra_fields)
                .and_then(|msg| signing::verify_from_base64(&card_key, &msg, &sig.signature))
                .is_ok(),
            None => false,
        };

        let mut signers_valid = Vec::with_capacity(self.whitelist.len());
        for creds in &self.whitelist {
            let key = signing::verifying_key_from_base64(&creds.public_key)?;
            let ok = match card.signature_by(&creds.signer) {
                Some(sig) => card
                    .signed_message(&sig.extra_fields)
                    .and_then(|msg| signing::verify_from_base64(&key, &msg, &sig.signature))
                    .is_ok(),
                None => false,
            };
            signers_valid.push((creds.signer.clone(), ok));
        }

        let is_valid = id_valid
            && content_valid
            && self_signature_valid
            && signers_valid.iter().all(|(_, ok)| *ok);

        Ok(CardVerification {
            id_valid,
            content_valid,
            self_signature_valid,
            signers_valid,
            is_valid,
            verified_at: now,
        })
    }

    /// Verify and turn the first failed check into an error.
    pub fn check(&self, card: &Card) -> Result<()> {
        let verification = self.verify(card)?;
        match verification.failure() {
            None => Ok(()),
            Some(reason) => Err(CardError::VerificationFailed(format!("{}: {reason}", card.id))),
        }
    }
}

/// Verify a card's ID, content and self signature only.
pub fn verify_card(card: &Card) -> Result<CardVerification> {
    CardVerifier::new().verify(card)
}
