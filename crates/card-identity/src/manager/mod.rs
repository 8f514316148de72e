//! Card manager: the card directory.
//!
//! Publishing counter-signs a card with the service key and persists it.
//! Searching returns the newest cards of an identity with every replaced
//! predecessor linked behind it and marked outdated. Revoking removes a
//! card together with its predecessor chain.
//!
//! Publishing and revoking hold the card store's writer lock from the
//! first check to the last write, so processes sharing a directory cannot
//! fork a chain by replacing the same card twice.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::card::{verify_card, Card, CardId, CardVerifier, SERVICE_SIGNER};
use crate::config::ClientConfig;
use crate::crypto::CardKeyPair;
use crate::error::{CardError, Result};
use crate::storage::{CardStore, LocalKeyStorage};

/// Key prefix of the service signing key entry.
const SERVICE_KEY_PREFIX: &str = "service";
/// Identity under which the service key is stored.
const SERVICE_KEY_IDENTITY: &str = "cards";

/// Filesystem-backed card directory.
pub struct CardManager {
    store: CardStore,
    service_key: CardKeyPair,
    verifier: CardVerifier,
}

impl CardManager {
    /// Open the directory under `config.root_dir`, creating the service
    /// key on first use.
    ///
    /// # Errors
    ///
    /// Returns `CardError::Io` for filesystem errors and
    /// `CardError::InvalidFileFormat` if the service key entry is corrupt.
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let store = CardStore::new(config.cards_dir())?;
        let service_keys =
            LocalKeyStorage::new(config.keys_dir(), SERVICE_KEY_PREFIX, SERVICE_KEY_IDENTITY)?;

        let service_key = if service_keys.exists() {
            service_keys.retrieve_key_pair()?
        } else {
            let key = CardKeyPair::generate();
            service_keys.store(&key, BTreeMap::new())?;
            log::info!("created card service key {}", key.key_id());
            key
        };

        let verifier =
            CardVerifier::new().with_signer(SERVICE_SIGNER, service_key.public_key_base64());
        Ok(Self {
            store,
            service_key,
            verifier,
        })
    }

    /// Public key whose signature every published card carries.
    pub fn service_public_key(&self) -> String {
        self.service_key.public_key_base64()
    }

    /// Verifier requiring the self signature and the service signature.
    pub fn verifier(&self) -> &CardVerifier {
        &self.verifier
    }

    /// Counter-sign and persist a self-signed card.
    ///
    /// # Errors
    ///
    /// - `CardError::VerificationFailed` if the self signature is invalid.
    /// - `CardError::DuplicateSigner` if the card already has a service
    ///   signature.
    /// - `CardError::NotFound` if the previous card does not exist.
    /// - `CardError::IdentityMismatch` if the previous card belongs to
    ///   another identity.
    /// - `CardError::CardAlreadyReplaced` if the previous card has
    ///   already been replaced.
    /// - `CardError::StoreBusy` if another writer holds the store lock.
    pub fn publish_card(&self, mut card: Card) -> Result<Card> {
        let verification = verify_card(&card)?;
        if let Some(reason) = verification.failure() {
            return Err(CardError::VerificationFailed(format!("{}: {reason}", card.id)));
        }

        let _lock = self.store.lock()?;
        if self.store.contains(&card.id) {
            return Err(CardError::InvalidArgument(format!(
                "card {} is already published",
                card.id
            )));
        }

        if let Some(previous_id) = &card.previous_card_id {
            let previous = self.store.load_card(previous_id)?;
            if previous.identity != card.identity {
                return Err(CardError::IdentityMismatch {
                    expected: previous.identity,
                    actual: card.identity,
                });
            }
            if self.replacement_of(previous_id)?.is_some() {
                return Err(CardError::CardAlreadyReplaced(previous_id.to_string()));
            }
        }

        card.add_signature(SERVICE_SIGNER, &self.service_key, BTreeMap::new())?;
        self.store.save_card(&card)?;
        card.is_outdated = false;
        card.previous_card = None;

        log::info!(
            "published card {} for '{}'{}",
            card.id,
            card.identity,
            card.previous_card_id
                .as_ref()
                .map(|p| format!(" replacing {p}"))
                .unwrap_or_default()
        );
        Ok(card)
    }

    /// The newest cards of `identity`, newest first, each with its replaced
    /// predecessors linked through `previous_card` and marked outdated.
    ///
    /// # Errors
    ///
    /// Returns `CardError::VerificationFailed` if any stored card of the
    /// identity fails verification.
    pub fn search_cards(&self, identity: &str) -> Result<Vec<Card>> {
        let mut by_id: HashMap<CardId, Card> = HashMap::new();
        for card in self.store.load_all()? {
            if card.identity == identity {
                self.verifier.check(&card)?;
                by_id.insert(card.id.clone(), card);
            }
        }

        let replaced: HashSet<CardId> = by_id
            .values()
            .filter_map(|c| c.previous_card_id.clone())
            .collect();

        let mut newest: Vec<Card> = by_id
            .values()
            .filter(|c| !replaced.contains(&c.id))
            .cloned()
            .collect();
        newest.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        for card in &mut newest {
            card.previous_card = link_history(card.previous_card_id.as_ref(), &by_id);
        }

        log::debug!(
            "search '{}': {} card(s), {} outdated",
            identity,
            newest.len(),
            replaced.len()
        );
        Ok(newest)
    }

    /// Load one verified card with its outdated flag computed.
    pub fn get_card(&self, id: &CardId) -> Result<Card> {
        let mut card = self.store.load_card(id)?;
        self.verifier.check(&card)?;
        card.is_outdated = self.replacement_of(id)?.is_some();
        Ok(card)
    }

    /// Revoke a current card and every predecessor it replaced.
    ///
    /// Returns the revoked IDs, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CardError::NotFound` if the card is not active and
    /// `CardError::CardAlreadyReplaced` if a newer card replaced it.
    pub fn revoke_card(&self, id: &CardId) -> Result<Vec<CardId>> {
        let _lock = self.store.lock()?;
        let card = self.store.load_card(id)?;
        if let Some(newer) = self.replacement_of(id)? {
            log::warn!("refusing to revoke {id}: replaced by {newer}");
            return Err(CardError::CardAlreadyReplaced(id.to_string()));
        }

        let mut revoked = Vec::new();
        self.store.revoke_card(&card.id)?;
        revoked.push(card.id);

        let mut next = card.previous_card_id;
        while let Some(previous_id) = next {
            if !self.store.contains(&previous_id) {
                break;
            }
            let previous = self.store.load_card(&previous_id)?;
            self.store.revoke_card(&previous_id)?;
            revoked.push(previous_id);
            next = previous.previous_card_id;
        }

        log::info!("revoked {} card(s) for '{}'", revoked.len(), card.identity);
        Ok(revoked)
    }

    /// The active card that replaced `id`, if any.
    fn replacement_of(&self, id: &CardId) -> Result<Option<CardId>> {
        Ok(self
            .store
            .load_all()?
            .into_iter()
            .find(|c| c.previous_card_id.as_ref() == Some(id))
            .map(|c| c.id))
    }
}

/// Build the outdated predecessor chain starting at `previous_id`.
fn link_history(previous_id: Option<&CardId>, by_id: &HashMap<CardId, Card>) -> Option<Box<Card>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut next = previous_id;
    while let Some(id) = next {
        let Some(card) = by_id.get(id) else { break };
        if !seen.insert(id) {
            break;
        }
        chain.push(card);
        next = card.previous_card_id.as_ref();
    }

    chain.into_iter().rev().fold(None, |older, card| {
        let mut card = card.clone();
        card.is_outdated = true;
        card.previous_card = older;
        Some(Box::new(card))
    })
}
