//! Finding other users' cards through the client's lookup cache.

use crate::card::Card;
use crate::error::{CardError, Result};
use crate::filter::CardFilter;
use crate::lookup::{FindUsersResult, LookupResult};

use super::CardClient;

impl CardClient {
    /// Resolve several identities to one card each; see
    /// [`LookupManager::lookup_cards`](crate::lookup::LookupManager::lookup_cards).
    pub fn find_users<I, S>(
        &mut self,
        identities: I,
        force_reload: bool,
        check_result: bool,
        filter: &CardFilter,
    ) -> Result<FindUsersResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.lookup
            .lookup_cards(&self.cards, identities, force_reload, check_result, filter)
    }

    /// Resolve one identity to its card.
    pub fn find_user(
        &mut self,
        identity: &str,
        force_reload: bool,
        filter: &CardFilter,
    ) -> Result<Card> {
        self.lookup.lookup_card(&self.cards, identity, force_reload, filter)
    }

    /// Cached card of one identity, if any.
    pub fn find_cached_user(&self, identity: &str) -> Option<Card> {
        match self.lookup.lookup_cached_card(identity) {
            Ok(card) => Some(card),
            Err(CardError::UsersNotFound(_)) => None,
            Err(e) => {
                log::warn!("cached lookup of '{identity}' failed: {e}");
                None
            }
        }
    }

    /// Cached cards of several identities.
    pub fn find_cached_users<I, S>(
        &self,
        identities: I,
        check_result: bool,
    ) -> Result<FindUsersResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.lookup.lookup_cached_cards(identities, check_result)
    }

    /// Refresh cached cards that were replaced or revoked.
    pub fn update_cached_users(&mut self) -> Result<usize> {
        self.lookup.update_cached_cards(&self.cards)
    }

    /// Public keys of several identities, always searched.
    pub fn lookup_public_keys<I, S>(
        &mut self,
        identities: I,
        filter: &CardFilter,
    ) -> Result<LookupResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.lookup.lookup_public_keys(&self.cards, identities, filter)
    }

    /// This identity's current cards, with outdated history linked.
    pub fn own_cards(&self) -> Result<Vec<Card>> {
        self.cards.search_cards(&self.identity)
    }
}
