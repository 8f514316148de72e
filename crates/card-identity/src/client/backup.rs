//! Password-protected backup of the local private key.

use crate::crypto::CardKeyPair;
use crate::error::{CardError, Result};

use super::CardClient;

impl CardClient {
    /// Encrypt the local private key under `password` and keep it in the
    /// backup store.
    ///
    /// # Errors
    ///
    /// - `CardError::MissingPrivateKey` if no local key is stored.
    /// - `CardError::BackupAlreadyExists` if a backup is already present.
    pub fn backup_private_key(&self, password: &str) -> Result<()> {
        let key_pair = self.keys.retrieve_key_pair()?;
        let meta = self.keys.meta()?;
        self.backups.store(&key_pair, meta, password)
    }

    /// Decrypt the backup and store it as the local private key.
    ///
    /// # Errors
    ///
    /// - `CardError::PrivateKeyExists` if a local key is already stored.
    /// - `CardError::BackupNotFound` if there is no backup.
    /// - `CardError::InvalidPassword` if `password` does not open it.
    pub fn restore_private_key(&mut self, password: &str) -> Result<CardKeyPair> {
        if self.keys.exists() {
            return Err(CardError::PrivateKeyExists);
        }
        let (key_pair, meta) = self.backups.retrieve(password)?;

        let public_key = key_pair.public_key_base64();
        let cards = self.cards.search_cards(&self.identity)?;
        if !cards.iter().any(|c| c.public_key == public_key) {
            log::warn!(
                "restored key {} for '{}' matches no current card",
                key_pair.key_id(),
                self.identity
            );
        }

        self.keys.store(&key_pair, meta)?;
        self.lookup.evict(&self.identity);
        log::info!("restored private key for '{}'", self.identity);
        Ok(key_pair)
    }

    /// Re-encrypt the backup under a new password.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidPassword` if `old_password` is wrong and
    /// `CardError::BackupNotFound` if there is no backup.
    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        self.backups.change_password(old_password, new_password)
    }

    /// Whether a private key backup exists for this identity.
    pub fn has_private_key_backup(&self) -> bool {
        self.backups.exists()
    }

    /// Delete the backup after checking `password`.
    pub fn delete_private_key_backup(&self, password: &str) -> Result<()> {
        self.backups.delete(password)
    }

    /// Delete the backup without its password.
    ///
    /// # Errors
    ///
    /// Returns `CardError::BackupNotFound` if there is no backup.
    pub fn reset_private_key_backup(&self) -> Result<()> {
        self.backups.reset()
    }
}
