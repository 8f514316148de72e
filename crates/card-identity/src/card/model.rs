//! Card and card-signature types.
//!
//! A card binds an identity string to an Ed25519 public key. The bound
//! fields are serialized once into a *content snapshot*; the card ID is
//! the SHA-256 of that snapshot and every signature covers it, followed by
//! the signature's own extra fields.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{signing, CardKeyPair};
use crate::error::{CardError, Result};

/// Card format version written into every content snapshot.
pub const CARD_VERSION: &str = "5.0";

/// Signer name of the card holder's own signature.
pub const SELF_SIGNER: &str = "self";

/// Signer name of the card service's signature, added on publish.
pub const SERVICE_SIGNER: &str = "service";

/// Length of a card ID in hex characters.
const CARD_ID_LEN: usize = 64;

/// Unique identifier for a card.
///
/// Format: lowercase hex of SHA-256(content snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardId(pub String);

impl CardId {
    /// Compute the card ID for a content snapshot.
    pub fn from_snapshot(snapshot: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(snapshot)))
    }

    /// Parse user input into a card ID.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidArgument` unless `s` is 64 lowercase hex
    /// characters.
    pub fn parse(s: &str) -> Result<Self> {
        let id = Self(s.to_string());
        if !id.is_well_formed() {
            return Err(CardError::InvalidArgument(format!("malformed card id: {s:?}")));
        }
        Ok(id)
    }

    /// Whether this ID has the shape of a SHA-256 hex digest.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == CARD_ID_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The signed content of a card, serialized into the content snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardContent {
    pub identity: String,
    pub public_key: String,
    pub version: String,
    pub created_at: u64,
    pub previous_card_id: Option<CardId>,
}

impl CardContent {
    /// Serialize into snapshot bytes.
    pub fn to_snapshot(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CardError::SerializationError(e.to_string()))
    }
}

/// A signature over a card's content snapshot plus its extra fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSignature {
    /// Who signed: [`SELF_SIGNER`], [`SERVICE_SIGNER`], or another authority.
    pub signer: String,
    /// Base64 Ed25519 signature.
    pub signature: String,
    /// Unencrypted metadata covered by the signature.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_fields: BTreeMap<String, String>,
}

impl CardSignature {
    /// Look up one extra field.
    pub fn extra_field(&self, key: &str) -> Option<&str> {
        self.extra_fields.get(key).map(String::as_str)
    }
}

/// A signed identity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub identity: String,
    /// Base64 Ed25519 public key.
    pub public_key: String,
    pub version: String,
    /// Creation time, seconds since Unix epoch.
    pub created_at: u64,
    /// The card this one replaces, if any.
    pub previous_card_id: Option<CardId>,
    /// Base64 of the serialized [`CardContent`].
    pub content_snapshot: String,
    /// Signatures in the order they were added.
    pub signatures: Vec<CardSignature>,
    /// Set when a newer card replaces this one. Computed by the card
    /// manager, never persisted.
    #[serde(skip)]
    pub is_outdated: bool,
    /// The replaced predecessor, linked by the card manager on search.
    #[serde(skip)]
    pub previous_card: Option<Box<Card>>,
}

impl Card {
    /// The content fields as a [`CardContent`].
    pub fn content(&self) -> CardContent {
        CardContent {
            identity: self.identity.clone(),
            public_key: self.public_key.clone(),
            version: self.version.clone(),
            created_at: self.created_at,
            previous_card_id: self.previous_card_id.clone(),
        }
    }

    /// Decode the content snapshot bytes.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.content_snapshot)
            .map_err(|e| CardError::InvalidFileFormat(format!("invalid content snapshot: {e}")))
    }

    /// Decode the card's public key.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        signing::verifying_key_from_base64(&self.public_key)
    }

    /// The first signature made by `signer`.
    pub fn signature_by(&self, signer: &str) -> Option<&CardSignature> {
        self.signatures.iter().find(|s| s.signer == signer)
    }

    /// The card holder's own signature.
    pub fn self_signature(&self) -> Option<&CardSignature> {
        self.signature_by(SELF_SIGNER)
    }

    /// Value of `key` in the first signature, in signature order, whose
    /// extra fields contain it. Later signatures are not consulted.
    pub fn extra_field(&self, key: &str) -> Option<&str> {
        self.signatures.iter().find_map(|s| s.extra_field(key))
    }

    /// Iterate this card and its linked predecessors, newest first.
    pub fn history(&self) -> impl Iterator<Item = &Card> {
        std::iter::successors(Some(self), |card| card.previous_card.as_deref())
    }

    /// Sign the card as `signer` and append the signature.
    ///
    /// # Errors
    ///
    /// Returns `CardError::DuplicateSigner` if `signer` already signed.
    pub fn add_signature(
        &mut self,
        signer: &str,
        key_pair: &CardKeyPair,
        extra_fields: BTreeMap<String, String>,
    ) -> Result<()> {
        if self.signature_by(signer).is_some() {
            return Err(CardError::DuplicateSigner(
                self.id.to_string(),
                signer.to_string(),
            ));
        }
        let message = self.signed_message(&extra_fields)?;
        self.signatures.push(CardSignature {
            signer: signer.to_string(),
            signature: signing::sign_to_base64(key_pair.signing_key(), &message),
            extra_fields,
        });
        Ok(())
    }

    /// Bytes covered by a signature carrying `extra_fields`.
    pub(crate) fn signed_message(
        &self,
        extra_fields: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>> {
        let mut message = self.snapshot_bytes()?;
        if !extra_fields.is_empty() {
            let extra = serde_json::to_vec(extra_fields)
                .map_err(|e| CardError::SerializationError(e.to_string()))?;
            message.extend_from_slice(&extra);
        }
        Ok(message)
    }
}
