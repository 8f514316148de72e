//! Card persistence.
//!
//! Stores `Card` records as JSON files:
//!
//! ```text
//! {base_dir}/
//! ├── {card_id}.json    active cards
//! ├── .lock             writer lock
//! └── revoked/
//!     └── {card_id}.json
//! ```
//!
//! Files are written through a sibling temp file and renamed into place.
//! Writers that read before they write hold [`CardStore::lock`] across
//! both steps; the lock is an OS advisory lock and is released when the
//! guard drops or the process exits.
//!
//! File format:
//! ```json
//! { "version": 1, "card": { ... Card ... } }
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::card::{Card, CardId};
use crate::error::{CardError, Result};

const CARD_FILE_VERSION: u32 = 1;

const REVOKED_DIR: &str = "revoked";

const LOCK_FILE: &str = ".lock";
const LOCK_RETRIES: usize = 50;
const LOCK_RETRY_SLEEP: Duration = Duration::from_millis(100);

/// Wrapper written to disk for each card.
#[derive(Debug, Serialize, Deserialize)]
struct CardFile {
    version: u32,
    card: Card,
}

/// Exclusive writer lock on a card store, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!("failed to release card store lock: {e}");
        }
    }
}

/// Filesystem-backed store for published cards.
pub struct CardStore {
    base_dir: PathBuf,
}

impl CardStore {
    /// Open a store rooted at `base_dir`, creating `revoked/` if needed.
    ///
    /// # Errors
    ///
    /// Returns `CardError::Io` if the directories cannot be created.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(base_dir.join(REVOKED_DIR))?;
        Ok(Self { base_dir })
    }

    /// Take the writer lock, waiting up to five seconds for another
    /// holder to release it.
    ///
    /// # Errors
    ///
    /// Returns `CardError::StoreBusy` if the lock stays held.
    pub fn lock(&self) -> Result<StoreLock> {
        let file = self.open_lock_file()?;
        for _ in 0..LOCK_RETRIES {
            if file.try_lock_exclusive().is_ok() {
                return Ok(StoreLock { file });
            }
            std::thread::sleep(LOCK_RETRY_SLEEP);
        }
        Err(CardError::StoreBusy(self.base_dir.join(LOCK_FILE).display().to_string()))
    }

    /// Take the writer lock only if it is free right now.
    pub fn try_lock(&self) -> Result<Option<StoreLock>> {
        let file = self.open_lock_file()?;
        Ok(file.try_lock_exclusive().ok().map(|()| StoreLock { file }))
    }

    /// Persist an active card, replacing any file with the same ID.
    pub fn save_card(&self, card: &Card) -> Result<()> {
        let path = self.card_path(&card.id)?;
        let file = CardFile {
            version: CARD_FILE_VERSION,
            card: card.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| CardError::SerializationError(e.to_string()))?;
        write_atomic(&path, json.as_bytes())
    }

    /// Load an active card.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidArgument` for a malformed ID,
    /// `CardError::NotFound` if no active card has this ID,
    /// `CardError::InvalidFileFormat` for malformed files.
    pub fn load_card(&self, id: &CardId) -> Result<Card> {
        let path = self.card_path(id)?;
        if !path.exists() {
            return Err(CardError::NotFound(id.to_string()));
        }
        read_card(&path)
    }

    /// Return `true` if an active card file exists for `id`.
    pub fn contains(&self, id: &CardId) -> bool {
        self.card_path(id).map(|p| p.exists()).unwrap_or(false)
    }

    /// Load every readable active card. Order is unspecified.
    ///
    /// Files that fail to parse are logged and skipped, so one damaged
    /// file does not hide the rest of the directory.
    pub fn load_all(&self) -> Result<Vec<Card>> {
        let mut cards = Vec::new();
        for id in self.list_ids()? {
            let path = self.card_path(&id)?;
            match read_card(&path) {
                Ok(card) => cards.push(card),
                Err(CardError::InvalidFileFormat(e)) => {
                    log::warn!("skipping unreadable card file: {e}");
                }
                // Revoked by another process since the listing.
                Err(CardError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(cards)
    }

    /// List the IDs of all active cards. Order is unspecified.
    ///
    /// Files whose name is not a well-formed card ID are ignored.
    pub fn list_ids(&self) -> Result<Vec<CardId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            let id = CardId(stem.to_string());
            if id.is_well_formed() {
                ids.push(id);
            } else {
                log::debug!("ignoring {} in card store", entry.path().display());
            }
        }
        Ok(ids)
    }

    /// Move an active card into `revoked/`.
    ///
    /// # Errors
    ///
    /// Returns `CardError::InvalidArgument` for a malformed ID and
    /// `CardError::NotFound` if no active card has this ID.
    pub fn revoke_card(&self, id: &CardId) -> Result<()> {
        let path = self.card_path(id)?;
        if !path.exists() {
            return Err(CardError::NotFound(id.to_string()));
        }
        std::fs::rename(&path, self.revoked_path(id)?)?;
        Ok(())
    }

    /// Return `true` if the card has been revoked.
    pub fn is_revoked(&self, id: &CardId) -> bool {
        self.revoked_path(id).map(|p| p.exists()).unwrap_or(false)
    }

    fn open_lock_file(&self) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.base_dir.join(LOCK_FILE))?)
    }

    fn card_path(&self, id: &CardId) -> Result<PathBuf> {
        Ok(self.base_dir.join(file_name(id)?))
    }

    fn revoked_path(&self, id: &CardId) -> Result<PathBuf> {
        Ok(self.base_dir.join(REVOKED_DIR).join(file_name(id)?))
    }
}

/// `{id}.json`, for well-formed IDs only.
fn file_name(id: &CardId) -> Result<String> {
    if !id.is_well_formed() {
        return Err(CardError::InvalidArgument(format!("malformed card id: {:?}", id.0)));
    }
    Ok(format!("{}.json", id.0))
}

/// Write `data` to `path` through a sibling temp file and a rename.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_card(path: &Path) -> Result<Card> {
    let bytes = std::fs::read(path)?;
    let file: CardFile = serde_json::from_slice(&bytes).map_err(|e| {
        CardError::InvalidFileFormat(format!("failed to parse card file {}: {e}", path.display()))
    })?;
    Ok(file.card)
}
