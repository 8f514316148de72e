//! Account lifecycle: register, rotate, unregister.
//!
//! Each operation searches the identity's current cards and narrows them
//! with a [`CardFilter`]. Registering an account uses
//! [`CardFilter::Account`]; registering a device uses
//! [`CardFilter::DeviceId`] so other devices' cards do not block it.

use std::collections::BTreeMap;

use crate::card::{Card, CardBuilder, CardId};
use crate::crypto::CardKeyPair;
use crate::error::{CardError, Result};
use crate::filter::CardFilter;

use super::CardClient;

/// Key-entry metadata naming the card the key belongs to.
pub const CARD_ID_META: &str = "card_id";

impl CardClient {
    /// Publish a first card for this identity.
    ///
    /// Uses `key_pair` when given, otherwise generates one. The private
    /// key is stored locally after the card is published.
    ///
    /// # Errors
    ///
    /// - `CardError::PrivateKeyExists` if a local key is already stored.
    /// - `CardError::UserAlreadyRegistered` if a current card passes
    ///   `filter`.
    pub fn register(
        &mut self,
        key_pair: Option<CardKeyPair>,
        filter: &CardFilter,
        additional_data: BTreeMap<String, String>,
    ) -> Result<Card> {
        if self.keys.exists() {
            return Err(CardError::PrivateKeyExists);
        }

        let cards = self.cards.search_cards(&self.identity)?;
        if let Some(existing) = filter.first(&cards) {
            log::debug!("register '{}': {} passes {filter}", self.identity, existing.id);
            return Err(CardError::UserAlreadyRegistered);
        }

        let card = self.publish_card_then_save_local(key_pair, None, additional_data)?;
        log::info!("registered '{}' with card {}", self.identity, card.id);
        Ok(card)
    }

    /// Replace the first current card passing `filter` with a card for a
    /// fresh key.
    ///
    /// # Errors
    ///
    /// - `CardError::PrivateKeyExists` if a local key is still stored.
    /// - `CardError::UserNotRegistered` if no current card passes `filter`.
    pub fn rotate_private_key(
        &mut self,
        additional_data: BTreeMap<String, String>,
        filter: &CardFilter,
    ) -> Result<Card> {
        if self.keys.exists() {
            return Err(CardError::PrivateKeyExists);
        }

        let cards = self.cards.search_cards(&self.identity)?;
        let previous = filter
            .first(&cards)
            .map(|card| card.id.clone())
            .ok_or(CardError::UserNotRegistered)?;

        let card =
            self.publish_card_then_save_local(None, Some(previous.clone()), additional_data)?;
        log::info!("rotated '{}': {previous} -> {}", self.identity, card.id);
        Ok(card)
    }

    /// Revoke the first current card passing `filter` and delete the local
    /// key. A missing local key does not fail the call.
    ///
    /// # Errors
    ///
    /// Returns `CardError::UserNotRegistered` if no current card passes
    /// `filter`.
    pub fn unregister(&mut self, filter: &CardFilter) -> Result<Vec<CardId>> {
        let cards = self.cards.search_cards(&self.identity)?;
        let card_id = filter
            .first(&cards)
            .map(|card| card.id.clone())
            .ok_or(CardError::UserNotRegistered)?;

        let revoked = self.cards.revoke_card(&card_id)?;
        if self.keys.exists() {
            self.keys.delete()?;
        } else {
            log::warn!("unregister '{}': no local private key to delete", self.identity);
        }
        self.lookup.evict(&self.identity);
        Ok(revoked)
    }

    /// Whether a private key for this identity is stored locally.
    pub fn has_local_private_key(&self) -> bool {
        self.keys.exists()
    }

    /// The locally stored key pair.
    pub fn local_key_pair(&self) -> Result<CardKeyPair> {
        self.keys.retrieve_key_pair()
    }

    /// Delete the local private key, leaving published cards in place.
    ///
    /// # Errors
    ///
    /// Returns `CardError::MissingPrivateKey` if no key is stored.
    pub fn cleanup(&mut self) -> Result<()> {
        self.keys.delete()?;
        self.lookup.evict(&self.identity);
        Ok(())
    }

    fn publish_card_then_save_local(
        &mut self,
        key_pair: Option<CardKeyPair>,
        previous_card_id: Option<CardId>,
        additional_data: BTreeMap<String, String>,
    ) -> Result<Card> {
        let key_pair = key_pair.unwrap_or_else(CardKeyPair::generate);

        let mut builder =
            CardBuilder::new(self.identity.clone(), &key_pair).extra_fields(additional_data);
        if let Some(previous) = previous_card_id {
            builder = builder.previous_card_id(previous);
        }
        let card = self.cards.publish_card(builder.build()?)?;

        let mut meta = BTreeMap::new();
        meta.insert(CARD_ID_META.to_string(), card.id.to_string());
        self.keys.store(&key_pair, meta)?;
        self.lookup.evict(&self.identity);
        Ok(card)
    }
}
