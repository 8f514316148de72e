//! Error types for card-identity.
//!
//! Card filters never fail; everything else propagates a `CardError`.
//! Private key material is never included in error messages.

/// Error type covering card, storage, lookup and account operations.
#[derive(Debug, thiserror::Error)]
pub enum CardError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Card verification failed: {0}")]
    VerificationFailed(String),

    #[error("Card not found: {0}")]
    NotFound(String),

    #[error("Card {0} is already signed by {1}")]
    DuplicateSigner(String, String),

    #[error("Card identity mismatch: expected {expected}, got {actual}")]
    IdentityMismatch { expected: String, actual: String },

    #[error("Card {0} has already been replaced")]
    CardAlreadyReplaced(String),

    #[error("Users not found: {}", .0.join(", "))]
    UsersNotFound(Vec<String>),

    #[error("Found duplicate cards for identity: {0}")]
    DuplicateCards(String),

    #[error("Private key already exists in local key storage")]
    PrivateKeyExists,

    #[error("Private key not found in local key storage")]
    MissingPrivateKey,

    #[error("Key entry already exists: {0}")]
    KeyEntryAlreadyExists(String),

    #[error("User is already registered")]
    UserAlreadyRegistered,

    #[error("User is not registered")]
    UserNotRegistered,

    #[error("Card store is locked by another writer: {0}")]
    StoreBusy(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("No private key backup found for {0}")]
    BackupNotFound(String),

    #[error("Private key backup already exists for {0}")]
    BackupAlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, CardError>;
