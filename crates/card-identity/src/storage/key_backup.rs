//! Password-protected private key backups.
//!
//! A backup holds one key entry's private key and metadata, encrypted
//! with ChaCha20-Poly1305 under an Argon2id key derived from a password.
//! The public key stays in plaintext so a backup can be matched to a card
//! without the password.
//!
//! File format (`{backups_dir}/{key_name}.json`):
//! ```json
//! {
//!     "version": 1,
//!     "format": "cardid-backup-v1",
//!     "name": "cardid.alice",
//!     "encryption": {
//!         "algorithm": "chacha20-poly1305",
//!         "kdf": "argon2id",
//!         "kdf_params": { "m_cost": 65536, "t_cost": 3, "p_cost": 4 },
//!         "salt": "<base64-16-bytes>",
//!         "nonce": "<base64-12-bytes>"
//!     },
//!     "encrypted_key": "<base64-ciphertext>",
//!     "public_key": "<base64 Ed25519 public key>",
//!     "created_at": 1700000000
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::encryption::{self, KdfParams, NONCE_LEN, SALT_LEN};
use crate::crypto::CardKeyPair;
use crate::error::{CardError, Result};

const BACKUP_VERSION: u32 = 1;
const BACKUP_FORMAT: &str = "cardid-backup-v1";
const BACKUP_ALGORITHM: &str = "chacha20-poly1305";
const BACKUP_KDF: &str = "argon2id";

#[derive(Debug, Serialize, Deserialize)]
struct BackupFile {
    version: u32,
    format: String,
    name: String,
    encryption: EncryptionMetadata,
    encrypted_key: String,
    public_key: String,
    created_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncryptionMetadata {
    algorithm: String,
    kdf: String,
    kdf_params: KdfParams,
    salt: String,
    nonce: String,
}

/// Serialized, then encrypted.
#[derive(Serialize, Deserialize, Zeroize)]
struct BackupPayload {
    private_key: String,
    #[serde(default)]
    #[zeroize(skip)]
    meta: BTreeMap<String, String>,
}

/// Backup of one key entry, guarded by a password.
pub struct KeyBackupStore {
    name: String,
    base_dir: PathBuf,
    kdf: KdfParams,
}

impl KeyBackupStore {
    /// Open the backup slot for key entry `name` under `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            name: name.into(),
            base_dir,
            kdf: KdfParams::default(),
        })
    }

    /// Argon2id costs used for backups written from now on. Existing
    /// backups keep the costs recorded in their file.
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Encrypt and write a backup.
    ///
    /// # Errors
    ///
    /// Returns `CardError::BackupAlreadyExists` if a backup is present and
    /// `CardError::InvalidArgument` for an empty password.
    pub fn store(
        &self,
        key_pair: &CardKeyPair,
        meta: BTreeMap<String, String>,
        password: &str,
    ) -> Result<()> {
        if self.exists() {
            return Err(CardError::BackupAlreadyExists(self.name.clone()));
        }
        self.write(key_pair, meta, password, crate::time::now_secs())?;
        log::info!("backed up private key {}", self.name);
        Ok(())
    }

    /// Decrypt the backup.
    ///
    /// # Errors
    ///
    /// - `CardError::BackupNotFound` if there is no backup.
    /// - `CardError::InvalidPassword` if `password` does not open it.
    /// - `CardError::InvalidFileFormat` for a damaged file.
    pub fn retrieve(&self, password: &str) -> Result<(CardKeyPair, BTreeMap<String, String>)> {
        let file = self.read_file()?;
        let mut payload = decrypt_payload(&file, password)?;
        let key_pair = CardKeyPair::from_private_key_base64(&payload.private_key);
        let meta = std::mem::take(&mut payload.meta);
        payload.zeroize();
        Ok((key_pair?, meta))
    }

    /// Base64 public key of the backed-up key. Needs no password.
    pub fn public_key(&self) -> Result<String> {
        Ok(self.read_file()?.public_key)
    }

    /// Re-encrypt the backup under `new_password` with a fresh salt and
    /// nonce.
    ///
    /// # Errors
    ///
    /// Same as [`retrieve`](Self::retrieve) for `old_password`.
    pub fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let file = self.read_file()?;
        let (key_pair, meta) = self.retrieve(old_password)?;
        self.write(&key_pair, meta, new_password, file.created_at)?;
        log::info!("changed backup password for {}", self.name);
        Ok(())
    }

    /// Delete the backup after checking the password.
    pub fn delete(&self, password: &str) -> Result<()> {
        self.retrieve(password)?;
        self.reset()
    }

    /// Delete the backup without a password, for when it is forgotten.
    ///
    /// # Errors
    ///
    /// Returns `CardError::BackupNotFound` if there is no backup.
    pub fn reset(&self) -> Result<()> {
        if !self.exists() {
            return Err(CardError::BackupNotFound(self.name.clone()));
        }
        std::fs::remove_file(self.path())?;
        log::info!("removed private key backup {}", self.name);
        Ok(())
    }

    fn write(
        &self,
        key_pair: &CardKeyPair,
        meta: BTreeMap<String, String>,
        password: &str,
        created_at: u64,
    ) -> Result<()> {
        if password.is_empty() {
            return Err(CardError::InvalidArgument("backup password is empty".into()));
        }

        let mut payload = BackupPayload {
            private_key: key_pair.private_key_base64().to_string(),
            meta,
        };
        let plaintext = serde_json::to_vec(&payload)
            .map_err(|e| CardError::SerializationError(e.to_string()));
        payload.zeroize();
        let plaintext = Zeroizing::new(plaintext?);

        let salt = encryption::random_salt();
        let key = encryption::derive_password_key(password.as_bytes(), &salt, &self.kdf)?;
        let (nonce, ciphertext) = encryption::encrypt(&key, &plaintext)?;

        let file = BackupFile {
            version: BACKUP_VERSION,
            format: BACKUP_FORMAT.to_string(),
            name: self.name.clone(),
            encryption: EncryptionMetadata {
                algorithm: BACKUP_ALGORITHM.to_string(),
                kdf: BACKUP_KDF.to_string(),
                kdf_params: self.kdf,
                salt: STANDARD.encode(salt),
                nonce: STANDARD.encode(nonce),
            },
            encrypted_key: STANDARD.encode(&ciphertext),
            public_key: key_pair.public_key_base64(),
            created_at,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| CardError::SerializationError(e.to_string()))?;
        write_atomic(&self.path(), json.as_bytes())
    }

    fn read_file(&self) -> Result<BackupFile> {
        let path = self.path();
        if !path.exists() {
            return Err(CardError::BackupNotFound(self.name.clone()));
        }
        let bytes = std::fs::read(&path)?;
        let file: BackupFile = serde_json::from_slice(&bytes).map_err(|e| {
            CardError::InvalidFileFormat(format!("failed to parse backup {}: {e}", path.display()))
        })?;
        if file.version != BACKUP_VERSION || file.format != BACKUP_FORMAT {
            return Err(CardError::InvalidFileFormat(format!(
                "unsupported backup version={} format={}",
                file.version, file.format
            )));
        }
        Ok(file)
    }

    fn path(&self) -> PathBuf {
        self.base_dir.join(format!("{}.json", self.name))
    }
}

fn decrypt_payload(file: &BackupFile, password: &str) -> Result<BackupPayload> {
    let salt: [u8; SALT_LEN] = decode_fixed(&file.encryption.salt, "salt")?;
    let nonce: [u8; NONCE_LEN] = decode_fixed(&file.encryption.nonce, "nonce")?;
    let ciphertext = STANDARD
        .decode(&file.encrypted_key)
        .map_err(|e| CardError::InvalidFileFormat(format!("invalid ciphertext base64: {e}")))?;

    let key =
        encryption::derive_password_key(password.as_bytes(), &salt, &file.encryption.kdf_params)?;
    let plaintext = encryption::decrypt(&key, &nonce, &ciphertext)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| CardError::SerializationError(format!("backup payload: {e}")))
}

fn decode_fixed<const N: usize>(b64: &str, what: &str) -> Result<[u8; N]> {
    STANDARD
        .decode(b64)
        .map_err(|e| CardError::InvalidFileFormat(format!("invalid {what} base64: {e}")))?
        .try_into()
        .map_err(|_| CardError::InvalidFileFormat(format!("{what} must be {} bytes", N)))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
