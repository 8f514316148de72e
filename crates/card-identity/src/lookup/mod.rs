//! Card lookup with an in-memory cache.
//!
//! Lookups resolve each identity to exactly one card: the card manager's
//! search results are narrowed with a [`CardFilter`], more than one
//! survivor is an error, and the survivor is cached for later
//! cache-only lookups.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::card::Card;
use crate::error::{CardError, Result};
use crate::filter::CardFilter;
use crate::manager::CardManager;

/// Identity → resolved card.
pub type FindUsersResult = BTreeMap<String, Card>;

/// Identity → base64 public key.
pub type LookupResult = BTreeMap<String, String>;

/// Resolves identities to cards and caches the answers.
#[derive(Debug, Default)]
pub struct LookupManager {
    cache: HashMap<String, Card>,
}

impl LookupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `identities` to one card each.
    ///
    /// Cached cards that still pass `filter` are served without a search
    /// unless `force_reload` is set.
    ///
    /// # Errors
    ///
    /// - `CardError::InvalidArgument` if `identities` is empty.
    /// - `CardError::DuplicateCards` if several cards of one identity pass
    ///   the filter.
    /// - `CardError::UsersNotFound` if `check_result` is set and some
    ///   identity has no accepted card.
    pub fn lookup_cards<I, S>(
        &mut self,
        cards: &CardManager,
        identities: I,
        force_reload: bool,
        check_result: bool,
        filter: &CardFilter,
    ) -> Result<FindUsersResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let identities = collect_identities(identities)?;
        let mut result = FindUsersResult::new();
        let mut missing = Vec::new();

        for identity in identities {
            if !force_reload {
                if let Some(card) = self.cache.get(&identity).filter(|c| filter.accepts(c)) {
                    log::debug!("lookup '{identity}': cache hit {}", card.id);
                    result.insert(identity, card.clone());
                    continue;
                }
            }

            let found = cards.search_cards(&identity)?;
            let mut accepted = filter.select(&found);
            match accepted.len() {
                0 => {
                    log::debug!("lookup '{identity}': no card accepted by {filter}");
                    missing.push(identity);
                }
                1 => {
                    let card = accepted.remove(0).clone();
                    self.cache.insert(identity.clone(), card.clone());
                    result.insert(identity, card);
                }
                n => {
                    log::warn!("lookup '{identity}': {n} cards accepted by {filter}");
                    return Err(CardError::DuplicateCards(identity));
                }
            }
        }

        if check_result && !missing.is_empty() {
            return Err(CardError::UsersNotFound(missing));
        }
        Ok(result)
    }

    /// Resolve a single identity; a missing card is an error.
    pub fn lookup_card(
        &mut self,
        cards: &CardManager,
        identity: &str,
        force_reload: bool,
        filter: &CardFilter,
    ) -> Result<Card> {
        let mut result = self.lookup_cards(cards, [identity], force_reload, true, filter)?;
        result
            .remove(identity)
            .ok_or_else(|| CardError::UsersNotFound(vec![identity.to_string()]))
    }

    /// Cache-only lookup of several identities.
    pub fn lookup_cached_cards<I, S>(
        &self,
        identities: I,
        check_result: bool,
    ) -> Result<FindUsersResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let identities = collect_identities(identities)?;
        let mut result = FindUsersResult::new();
        let mut missing = Vec::new();
        for identity in identities {
            match self.cache.get(&identity) {
                Some(card) => {
                    result.insert(identity, card.clone());
                }
                None => missing.push(identity),
            }
        }
        if check_result && !missing.is_empty() {
            return Err(CardError::UsersNotFound(missing));
        }
        Ok(result)
    }

    /// Cache-only lookup of one identity.
    pub fn lookup_cached_card(&self, identity: &str) -> Result<Card> {
        self.cache
            .get(identity)
            .cloned()
            .ok_or_else(|| CardError::UsersNotFound(vec![identity.to_string()]))
    }

    /// Bring cached cards up to date.
    ///
    /// A cached card replaced by a newer one is swapped for the newest
    /// card of its chain; a cached card whose chain was revoked is dropped.
    /// Returns the number of cache entries changed.
    pub fn update_cached_cards(&mut self, cards: &CardManager) -> Result<usize> {
        let mut changed = 0;
        let identities: Vec<String> = self.cache.keys().cloned().collect();

        for identity in identities {
            let Some(cached_id) = self.cache.get(&identity).map(|c| c.id.clone()) else {
                continue;
            };
            let found = cards.search_cards(&identity)?;
            let successor = found
                .into_iter()
                .find(|card| card.history().any(|c| c.id == cached_id));

            match successor {
                Some(card) if card.id == cached_id => {}
                Some(card) => {
                    log::info!("cache '{identity}': {cached_id} replaced by {}", card.id);
                    self.cache.insert(identity, card);
                    changed += 1;
                }
                None => {
                    log::info!("cache '{identity}': {cached_id} revoked");
                    self.cache.remove(&identity);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    /// Resolve identities to public keys, always searching.
    pub fn lookup_public_keys<I, S>(
        &mut self,
        cards: &CardManager,
        identities: I,
        filter: &CardFilter,
    ) -> Result<LookupResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let found = self.lookup_cards(cards, identities, true, true, filter)?;
        Ok(found
            .into_iter()
            .map(|(identity, card)| (identity, card.public_key))
            .collect())
    }

    /// Drop one identity from the cache.
    pub fn evict(&mut self, identity: &str) -> Option<Card> {
        self.cache.remove(identity)
    }

    /// Identities currently cached, sorted.
    pub fn cached_identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cache.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Deduplicate identities, rejecting an empty request.
fn collect_identities<I, S>(identities: I) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let set: BTreeSet<String> = identities
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect();
    if set.is_empty() {
        return Err(CardError::InvalidArgument("identities should not be empty".into()));
    }
    Ok(set)
}
