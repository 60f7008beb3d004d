//! Encrypted vault index: the single durable root of trust.
//!
//! `index.bin` is a small plaintext JSON shell around an AEAD envelope.
//! The shell carries exactly what `unlock` needs before any key exists
//! — the version string, the Argon2 salt, and the key verifier(s) — and
//! the envelope holds the canonical JSON index body: the entry map,
//! metadata, and the second-factor and duress configs.
//!
//! ```text
//! {"version": "...", "salt": b64, "keyHash": b64,
//!  "duressKeyHash": b64?, "payload": base64(IV || ct || tag)}
//! ```
//!
//! The payload's AAD is the version string, so a shell cannot be
//! re-paired with a payload from a different vault generation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cloud::ChunkHandle;
use crate::errors::{Result, VaultError};
use crate::vault::entry::{EntryKind, FileMetadata};

/// Current vault format version. Versions are compared as strings and
/// must never decrease for a given vault.
pub const VAULT_VERSION: &str = "1.0.0";

/// Plaintext shell of `index.bin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexShell {
    pub version: String,
    /// Argon2 salt, base64, 32 bytes decoded.
    pub salt: String,
    /// SHA-256 of the master key, base64.
    pub key_hash: String,
    /// SHA-256 of the duress master key, base64, when duress is set up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duress_key_hash: Option<String>,
    /// AEAD envelope over the canonical JSON [`IndexBody`].
    pub payload: String,
}

/// How a carrier is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierKind {
    Png,
    Jpg,
    Decoy,
}

/// Where a carrier lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "store", rename_all = "lowercase")]
pub enum CarrierLocation {
    Local { path: PathBuf },
    Cloud { handle: ChunkHandle },
}

/// One carrier holding one fragment of an entry's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierDescriptor {
    pub carrier_type: CarrierKind,
    #[serde(flatten)]
    pub location: CarrierLocation,
}

/// Encrypted-at-rest view of one entry.
///
/// The title is an opaque envelope under the metadata key (AAD = entry
/// id); everything else here is what the search/list surface is allowed
/// to index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub encrypted_title: String,
    #[serde(default)]
    pub fragments: Vec<CarrierDescriptor>,
    pub kind: EntryKind,
    #[serde(with = "ts_milliseconds")]
    pub created: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Present only for file entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileMetadata>,
}

/// Vault-level bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    #[serde(with = "ts_milliseconds")]
    pub created: DateTime<Utc>,
    #[serde(with = "ts_milliseconds_option", default)]
    pub last_sync: Option<DateTime<Utc>>,
    pub entry_count: usize,
}

/// The decrypted index body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexBody {
    pub entries: HashMap<Uuid, IndexEntry>,
    pub metadata: IndexMetadata,
    /// Second-factor config, itself an envelope under the metadata key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_factor: Option<String>,
    /// Duress config, itself an envelope under the metadata key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duress: Option<String>,
    /// Chaff uploads awaiting a sweep.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decoys: Vec<ChunkHandle>,
    /// Cloud chunks owned by deleted entries, awaiting a sweep.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tombstones: Vec<ChunkHandle>,
}

impl IndexBody {
    /// A fresh, empty body.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            entries: HashMap::new(),
            metadata: IndexMetadata {
                created: now,
                last_sync: None,
                entry_count: 0,
            },
            second_factor: None,
            duress: None,
            decoys: Vec::new(),
            tombstones: Vec::new(),
        }
    }

    /// Check the entry-count invariant after decryption.
    pub fn validate(&self) -> Result<()> {
        if self.metadata.entry_count != self.entries.len() {
            return Err(VaultError::Corrupt(format!(
                "entry count {} does not match {} entries",
                self.metadata.entry_count,
                self.entries.len()
            )));
        }
        Ok(())
    }
}

/// Parse the plaintext shell of an index file.
pub fn read_shell(path: &Path) -> Result<IndexShell> {
    let raw = fs::read(path)?;
    let shell: IndexShell = serde_json::from_slice(&raw)
        .map_err(|e| VaultError::Corrupt(format!("index shell: {e}")))?;
    if shell.version.is_empty() {
        return Err(VaultError::Corrupt("index shell: empty version".into()));
    }
    Ok(shell)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> IndexEntry {
        IndexEntry {
            encrypted_title: "b64payload".into(),
            fragments: vec![CarrierDescriptor {
                carrier_type: CarrierKind::Png,
                location: CarrierLocation::Cloud {
                    handle: ChunkHandle {
                        id: "chunk-1".into(),
                        name: "a.png".into(),
                    },
                },
            }],
            kind: EntryKind::Credential,
            created: Utc::now(),
            modified: Utc::now(),
            favorite: false,
            category: Some("work".into()),
            file: None,
        }
    }

    #[test]
    fn carrier_descriptor_json_shape() {
        let descriptor = CarrierDescriptor {
            carrier_type: CarrierKind::Png,
            location: CarrierLocation::Local {
                path: PathBuf::from("carriers/x.png"),
            },
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains("\"carrierType\":\"png\""));
        assert!(json.contains("\"store\":\"local\""));

        let back: CarrierDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn index_entry_roundtrips() {
        let entry = sample_entry();
        let json = serde_json::to_string(&entry).unwrap();
        let back: IndexEntry = serde_json::from_str(&json).unwrap();
        // Millisecond serde truncates sub-millisecond precision.
        assert_eq!(back.encrypted_title, entry.encrypted_title);
        assert_eq!(back.fragments, entry.fragments);
        assert_eq!(back.kind, entry.kind);
        assert_eq!(back.category, entry.category);
    }

    #[test]
    fn empty_body_is_valid() {
        let body = IndexBody::empty(Utc::now());
        assert!(body.validate().is_ok());
    }

    #[test]
    fn count_mismatch_is_corrupt() {
        let mut body = IndexBody::empty(Utc::now());
        body.metadata.entry_count = 3;
        assert!(matches!(body.validate(), Err(VaultError::Corrupt(_))));
    }

    #[test]
    fn shell_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("index.bin");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(read_shell(&path), Err(VaultError::Corrupt(_))));
    }
}
