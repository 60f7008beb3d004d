//! Vault directory layout.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::errors::Result;

/// Resolved paths inside a vault directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPaths {
    /// The vault directory itself.
    pub dir: PathBuf,
    /// Encrypted vault index.
    pub index: PathBuf,
    /// Previous index generation, kept for recovery.
    pub index_bak: PathBuf,
    /// Decoy index unlocked by the duress passphrase.
    pub decoy_index: PathBuf,
    /// Per-entry encrypted record bodies.
    pub records: PathBuf,
    /// PNG carriers for local-only mode.
    pub carriers: PathBuf,
    /// Encrypted cloud tokens, opaque to the core.
    pub tokens: PathBuf,
    /// Writer lock held across index mutations.
    pub lock: PathBuf,
}

impl VaultPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            index: dir.join("index.bin"),
            index_bak: dir.join("index.bin.bak"),
            decoy_index: dir.join("decoy.bin"),
            records: dir.join("records"),
            carriers: dir.join("carriers"),
            tokens: dir.join("tokens.bin"),
            lock: dir.join(".slasshy.lock"),
            dir,
        }
    }

    /// Encrypted record body for an entry.
    pub fn record_path(&self, id: Uuid) -> PathBuf {
        self.records.join(format!("{id}.bin"))
    }

    /// Encrypted file-body blob for a file entry.
    pub fn blob_path(&self, id: Uuid) -> PathBuf {
        self.records.join(format!("{id}.blob"))
    }

    /// Persistent local carrier for one fragment of an entry.
    pub fn carrier_path(&self, id: Uuid, fragment_index: u16) -> PathBuf {
        self.carriers.join(format!("{id}-{fragment_index}.png"))
    }

    /// Create the directory skeleton if missing.
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::create_dir_all(&self.records)?;
        fs::create_dir_all(&self.carriers)?;
        Ok(())
    }
}

impl AsRef<Path> for VaultPaths {
    fn as_ref(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_in_the_vault_dir() {
        let paths = VaultPaths::new("/tmp/vault");
        assert_eq!(paths.index, PathBuf::from("/tmp/vault/index.bin"));
        assert_eq!(paths.records, PathBuf::from("/tmp/vault/records"));
        assert_eq!(paths.carriers, PathBuf::from("/tmp/vault/carriers"));
        assert_eq!(paths.tokens, PathBuf::from("/tmp/vault/tokens.bin"));
    }

    #[test]
    fn record_paths_embed_the_id() {
        let paths = VaultPaths::new("/v");
        let id = Uuid::nil();
        assert!(paths.record_path(id).to_string_lossy().ends_with(".bin"));
        assert!(paths.blob_path(id).to_string_lossy().ends_with(".blob"));
        assert!(paths
            .carrier_path(id, 3)
            .to_string_lossy()
            .ends_with("-3.png"));
    }

    #[test]
    fn ensure_layout_creates_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = VaultPaths::new(dir.path().join("vault"));
        paths.ensure_layout().unwrap();
        assert!(paths.records.is_dir());
        assert!(paths.carriers.is_dir());
    }
}
