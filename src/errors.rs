use thiserror::Error;
use uuid::Uuid;

/// Authentication and session-state failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("wrong passphrase")]
    BadPassphrase,

    #[error("vault is locked")]
    Locked,

    #[error("second factor required to complete unlock")]
    SecondFactorRequired,

    #[error("second factor rejected")]
    SecondFactorBad,
}

/// Failures from the cryptographic layer.
///
/// Authentication-tag mismatches always surface as the single `Tampered`
/// kind — callers never learn whether the key was wrong or the ciphertext
/// was modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("decryption failed — ciphertext tampered or wrong key")]
    Tampered,

    #[error("key derivation failed: {0}")]
    KdfFail(String),

    #[error("random generator failure: {0}")]
    RngFail(String),
}

/// Failures from the PNG steganography codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StegoError {
    #[error("carrier too small: payload needs {needed} bytes, capacity is {capacity}")]
    CarrierTooSmall { needed: usize, capacity: usize },

    #[error("carrier contains no embedded payload")]
    NoPayload,

    #[error("embedded payload truncated")]
    Truncated,

    #[error("embedded payload corrupt — checksum mismatch")]
    Corrupt,

    #[error("invalid carrier image: {0}")]
    InvalidImage(String),
}

/// Failures from the payload fragmenter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("payload cannot fit in {0} fragments")]
    TooMany(usize),

    #[error("missing fragment {0}")]
    Missing(u16),

    #[error("duplicate fragment {0}")]
    Duplicate(u16),

    #[error("fragment {0} corrupt — checksum mismatch")]
    Corrupt(u16),

    #[error("fragment buffer truncated")]
    Truncated,
}

/// Top-level error for vault operations.
///
/// The lower-level families are wrapped transparently so callers can still
/// match on the precise kind. Messages shown to untrusted surfaces must stay
/// generic; the full kind is routed to the local audit sink only.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault not initialized")]
    NotInitialized,

    #[error("vault already initialized")]
    AlreadyInitialized,

    #[error("entry {0} not found")]
    NotFound(Uuid),

    #[error("vault data corrupt: {0}")]
    Corrupt(String),

    #[error("conflicting vault state: {0}")]
    Conflict(String),

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cloud storage error: {0}")]
    Cloud(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Stego(#[from] StegoError),

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = VaultError> = std::result::Result<T, E>;
