//! Storage layer for published cards and local private keys.
//!
//! - [`card_store`]: card files, with a `revoked/` area and a writer lock.
//! - [`local_key`]: `{prefix}.{identity}` private key entries.
//! - [`key_backup`]: password-encrypted copies of those entries.

pub mod card_store;
pub mod key_backup;
pub mod local_key;

pub use card_store::{CardStore, StoreLock};
pub use key_backup::KeyBackupStore;
pub use local_key::LocalKeyStorage;
