//! Card client: one identity's view of the card system.
//!
//! [`CardClient`] ties together the card directory, the identity's local
//! private key, its password-protected backup and a lookup cache. Account
//! lifecycle operations live in [`account`], lookups in [`search`] and
//! key backup in [`backup`].

pub mod account;
pub mod backup;
pub mod search;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::lookup::LookupManager;
use crate::manager::CardManager;
use crate::storage::{KeyBackupStore, LocalKeyStorage};

/// Entry point for an identity: register, rotate, unregister, find users.
pub struct CardClient {
    identity: String,
    cards: CardManager,
    keys: LocalKeyStorage,
    backups: KeyBackupStore,
    lookup: LookupManager,
}

impl CardClient {
    /// Open a client for `identity` with the layout in `config`.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidArgument` for an unusable identity and
    /// `CardError::Io` for filesystem errors.
    pub fn open(config: &ClientConfig, identity: impl Into<String>) -> Result<Self> {
        let identity = identity.into();
        let cards = CardManager::open(config)?;
        let keys = LocalKeyStorage::new(
            config.keys_dir(),
            config.key_prefix.clone(),
            identity.clone(),
        )?;
        let backups = KeyBackupStore::new(config.backups_dir(), keys.key_name())?
            .with_kdf_params(config.backup_kdf);
        Ok(Self {
            identity,
            cards,
            keys,
            backups,
            lookup: LookupManager::new(),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn card_manager(&self) -> &CardManager {
        &self.cards
    }

    pub fn local_keys(&self) -> &LocalKeyStorage {
        &self.keys
    }

    pub fn key_backups(&self) -> &KeyBackupStore {
        &self.backups
    }
}
