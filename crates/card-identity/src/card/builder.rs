//! Builder for self-signed cards.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::crypto::CardKeyPair;
use crate::error::{CardError, Result};

use super::model::{Card, CardContent, CardId, CARD_VERSION, SELF_SIGNER};

/// Builds a card for `identity` bound to `key_pair`'s public key and signs
/// it with the same key.
pub struct CardBuilder<'a> {
    identity: String,
    key_pair: &'a CardKeyPair,
    previous_card_id: Option<CardId>,
    extra_fields: BTreeMap<String, String>,
    created_at: Option<u64>,
}

impl<'a> CardBuilder<'a> {
    pub fn new(identity: impl Into<String>, key_pair: &'a CardKeyPair) -> Self {
        Self {
            identity: identity.into(),
            key_pair,
            previous_card_id: None,
            extra_fields: BTreeMap::new(),
            created_at: None,
        }
    }

    /// Mark the new card as replacing `id`.
    pub fn previous_card_id(mut self, id: CardId) -> Self {
        self.previous_card_id = Some(id);
        self
    }

    /// Add one extra field to the self signature.
    pub fn extra_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_fields.insert(key.into(), value.into());
        self
    }

    /// Add several extra fields to the self signature.
    pub fn extra_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.extra_fields.extend(fields);
        self
    }

    /// Override the creation timestamp (seconds). Defaults to now.
    pub fn created_at(mut self, secs: u64) -> Self {
        self.created_at = Some(secs);
        self
    }

    /// Snapshot the content and self-sign.
    pub fn build(self) -> Result<Card> {
        if self.identity.is_empty() {
            return Err(CardError::InvalidArgument("identity must not be empty".into()));
        }

        let content = CardContent {
            identity: self.identity,
            public_key: self.key_pair.public_key_base64(),
            version: CARD_VERSION.to_string(),
            created_at: self.created_at.unwrap_or_else(crate::time::now_secs),
            previous_card_id: self.previous_card_id,
        };
        let snapshot = content.to_snapshot()?;

        let mut card = Card {
            id: CardId::from_snapshot(&snapshot),
            identity: content.identity,
            public_key: content.public_key,
            version: content.version,
            created_at: content.created_at,
            previous_card_id: content.previous_card_id,
            content_snapshot: STANDARD.encode(&snapshot),
            signatures: Vec::new(),
            is_outdated: false,
            previous_card: None,
        };
        card.add_signature(SELF_SIGNER, self.key_pair, self.extra_fields)?;
        Ok(card)
    }
}
