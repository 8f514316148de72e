//! Local private key storage.
//!
//! Each identity's private key lives in one JSON entry named
//! `{key_prefix}.{identity}`:
//!
//! ```json
//! {
//!     "version": 1,
//!     "name": "cardid.alice",
//!     "value": "<base64 private key>",
//!     "meta": { ... },
//!     "created_at": 1700000000
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::CardKeyPair;
use crate::error::{CardError, Result};

const KEY_ENTRY_VERSION: u32 = 1;

/// A stored private key.
#[derive(Serialize, Deserialize, Zeroize)]
struct KeyEntry {
    version: u32,
    name: String,
    value: String,
    #[serde(default)]
    #[zeroize(skip)]
    meta: BTreeMap<String, String>,
    created_at: u64,
}

/// Private key storage for a single identity.
pub struct LocalKeyStorage {
    identity: String,
    key_prefix: String,
    base_dir: PathBuf,
}

impl LocalKeyStorage {
    /// Open key storage for `identity` under `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidArgument` for an empty identity or one
    /// containing a path separator, `CardError::Io` if `base_dir` cannot be
    /// created.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        key_prefix: impl Into<String>,
        identity: impl Into<String>,
    ) -> Result<Self> {
        let identity = identity.into();
        if identity.is_empty() || identity.contains(['/', '\\']) {
            return Err(CardError::InvalidArgument(format!(
                "identity '{identity}' cannot name a key entry"
            )));
        }
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            identity,
            key_prefix: key_prefix.into(),
            base_dir,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Entry name: `{key_prefix}.{identity}`.
    pub fn key_name(&self) -> String {
        format!("{}.{}", self.key_prefix, self.identity)
    }

    pub fn exists(&self) -> bool {
        self.entry_path().exists()
    }

    /// Store the identity's private key.
    ///
    /// # Errors
    ///
    /// Returns `CardError::KeyEntryAlreadyExists` if an entry is present.
    pub fn store(&self, key_pair: &CardKeyPair, meta: BTreeMap<String, String>) -> Result<()> {
        if self.exists() {
            return Err(CardError::KeyEntryAlreadyExists(self.key_name()));
        }
        let mut entry = KeyEntry {
            version: KEY_ENTRY_VERSION,
            name: self.key_name(),
            value: key_pair.private_key_base64().to_string(),
            meta,
            created_at: crate::time::now_secs(),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| CardError::SerializationError(e.to_string()));
        entry.zeroize();
        let json = Zeroizing::new(json?);

        let path = self.entry_path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes())?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load the identity's key pair.
    ///
    /// # Errors
    ///
    /// Returns `CardError::MissingPrivateKey` if no entry is stored.
    pub fn retrieve_key_pair(&self) -> Result<CardKeyPair> {
        let mut entry = self.read_entry()?;
        let key_pair = CardKeyPair::from_private_key_base64(&entry.value);
        entry.zeroize();
        key_pair
    }

    /// Metadata stored alongside the key.
    pub fn meta(&self) -> Result<BTreeMap<String, String>> {
        let mut entry = self.read_entry()?;
        let meta = std::mem::take(&mut entry.meta);
        entry.zeroize();
        Ok(meta)
    }

    /// Delete the identity's key.
    ///
    /// # Errors
    ///
    /// Returns `CardError::MissingPrivateKey` if no entry is stored.
    pub fn delete(&self) -> Result<()> {
        let path = self.entry_path();
        if !path.exists() {
            return Err(CardError::MissingPrivateKey);
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn read_entry(&self) -> Result<KeyEntry> {
        let path = self.entry_path();
        if !path.exists() {
            return Err(CardError::MissingPrivateKey);
        }
        let bytes = Zeroizing::new(std::fs::read(&path)?);
        serde_json::from_slice(&bytes).map_err(|e| {
            CardError::InvalidFileFormat(format!(
                "failed to parse key entry {}: {e}",
                path.display()
            ))
        })
    }

    fn entry_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}.json", self.key_name()))
    }
}
