//! Vault index and record store.
//!
//! This module provides:
//! - the entry model and validators (`entry`)
//! - the encrypted index format (`index`)
//! - the vault directory layout (`paths`)
//! - the high-level `VaultStore` (`store`)

pub mod entry;
pub mod index;
pub mod paths;
pub mod store;

pub use entry::{
    CredentialFields, Entry, EntryKind, EntryPatch, EntrySummary, FileMetadata, Record, RecordBody,
};
pub use index::{
    CarrierDescriptor, CarrierKind, CarrierLocation, IndexBody, IndexEntry, IndexMetadata,
    IndexShell, VAULT_VERSION,
};
pub use paths::VaultPaths;
pub use store::{SecondFactorConfig, VaultStats, VaultStore};
