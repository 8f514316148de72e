//! Client configuration and on-disk layout.
//!
//! ```text
//! {root_dir}/
//! ├── cards/            active card files
//! │   └── revoked/      revoked card files
//! ├── keys/             local private key entries
//! └── backups/          password-encrypted key backups
//! ```

use std::path::{Path, PathBuf};

use crate::crypto::KdfParams;
use crate::error::{CardError, Result};

/// Environment variable overriding the default root directory.
pub const HOME_ENV: &str = "CARDID_HOME";

/// Key prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "cardid";

const CARDS_DIR: &str = "cards";
const KEYS_DIR: &str = "keys";
const BACKUPS_DIR: &str = "backups";

/// Where card and key files live, and how local key entries are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Root directory holding `cards/` and `keys/`.
    pub root_dir: PathBuf,
    /// Prefix for local key entry names (`{prefix}.{identity}`).
    pub key_prefix: String,
    /// Argon2id costs for new key backups.
    pub backup_kdf: KdfParams,
}

impl ClientConfig {
    /// Configuration rooted at `root_dir` with the default key prefix.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            backup_kdf: KdfParams::default(),
        }
    }

    /// Resolve the root directory from `CARDID_HOME`, falling back to
    /// `$HOME/.cardid`.
    pub fn from_env() -> Result<Self> {
        if let Some(dir) = std::env::var_os(HOME_ENV) {
            return Ok(Self::new(dir));
        }
        let home = std::env::var_os("HOME").ok_or_else(|| {
            CardError::InvalidArgument(format!("neither {HOME_ENV} nor HOME is set"))
        })?;
        Ok(Self::new(Path::new(&home).join(".cardid")))
    }

    /// Replace the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Replace the Argon2id costs used for new key backups.
    pub fn with_backup_kdf(mut self, kdf: KdfParams) -> Self {
        self.backup_kdf = kdf;
        self
    }

    pub fn cards_dir(&self) -> PathBuf {
        self.root_dir.join(CARDS_DIR)
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root_dir.join(KEYS_DIR)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root_dir.join(BACKUPS_DIR)
    }
}
