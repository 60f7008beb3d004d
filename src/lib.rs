//! Slasshy core — a zero-knowledge personal vault whose encrypted
//! records hide inside innocuous PNG images.
//!
//! The pipeline for a write: a validated plaintext entry is sealed by
//! the AES-256-GCM envelope, the ciphertext is split into
//! length-randomized fragments, and each fragment is embedded into the
//! least significant bits of a generated PNG carrier — stored locally
//! or handed to an untrusted cloud collaborator. The encrypted vault
//! index is the single root of trust tying ids to titles, metadata, and
//! carrier references. Reads reverse the pipeline.
//!
//! Keys derive from one passphrase: Argon2id produces the master key,
//! HKDF-SHA256 produces the labeled index/entry/metadata subkeys, and
//! an in-memory holder wipes everything on lock, auto-lock timeout, or
//! process exit.

pub mod audit;
pub mod cloud;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod fragment;
pub mod stego;
pub mod vault;

pub use cloud::{ChunkHandle, CloudStorage, InMemoryCloud};
pub use config::Settings;
pub use errors::{AuthError, CryptoError, FragmentError, Result, StegoError, VaultError};
pub use vault::{
    CredentialFields, Entry, EntryKind, EntryPatch, EntrySummary, FileMetadata, Record,
    RecordBody, VaultPaths, VaultStats, VaultStore,
};
