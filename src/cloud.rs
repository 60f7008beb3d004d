//! Cloud storage collaborator boundary.
//!
//! The core never talks to a provider directly; it hands fully
//! encrypted carrier PNGs to an implementation of [`CloudStorage`] and
//! stores the opaque handles it gets back. The provider is assumed
//! untrusted — nothing it sees is ever plaintext, and nothing about a
//! handle identifies the entry it belongs to.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};

/// Opaque reference to one uploaded chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkHandle {
    /// Provider-assigned identifier.
    pub id: String,
    /// The innocuous file name the chunk was uploaded under.
    pub name: String,
}

/// Contract the cloud collaborator implements.
pub trait CloudStorage {
    fn upload(&self, bytes: &[u8], name: &str, mime: &str) -> Result<ChunkHandle>;
    fn download(&self, handle: &ChunkHandle) -> Result<Vec<u8>>;
    fn delete(&self, handle: &ChunkHandle) -> Result<()>;
    fn list(&self, folder: &str) -> Result<Vec<ChunkHandle>>;
}

/// In-memory [`CloudStorage`] used by tests and local experiments.
#[derive(Debug, Default)]
pub struct InMemoryCloud {
    chunks: Mutex<HashMap<String, Vec<u8>>>,
    counter: Mutex<u64>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks currently stored.
    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl CloudStorage for InMemoryCloud {
    fn upload(&self, bytes: &[u8], name: &str, _mime: &str) -> Result<ChunkHandle> {
        let mut counter = self.counter.lock().unwrap_or_else(|e| e.into_inner());
        *counter += 1;
        let id = format!("chunk-{counter}");
        self.chunks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), bytes.to_vec());
        Ok(ChunkHandle {
            id,
            name: name.to_string(),
        })
    }

    fn download(&self, handle: &ChunkHandle) -> Result<Vec<u8>> {
        self.chunks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| VaultError::Cloud(format!("chunk {} not found", handle.id)))
    }

    fn delete(&self, handle: &ChunkHandle) -> Result<()> {
        self.chunks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.id)
            .map(|_| ())
            .ok_or_else(|| VaultError::Cloud(format!("chunk {} not found", handle.id)))
    }

    fn list(&self, _folder: &str) -> Result<Vec<ChunkHandle>> {
        Ok(self
            .chunks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .map(|id| ChunkHandle {
                id: id.clone(),
                name: String::new(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_download_roundtrip() {
        let cloud = InMemoryCloud::new();
        let handle = cloud.upload(b"bytes", "img.png", "image/png").unwrap();
        assert_eq!(cloud.download(&handle).unwrap(), b"bytes");
        assert_eq!(cloud.chunk_count(), 1);
    }

    #[test]
    fn delete_removes_the_chunk() {
        let cloud = InMemoryCloud::new();
        let handle = cloud.upload(b"x", "a.png", "image/png").unwrap();
        cloud.delete(&handle).unwrap();
        assert!(cloud.download(&handle).is_err());
    }

    #[test]
    fn handles_are_unique() {
        let cloud = InMemoryCloud::new();
        let a = cloud.upload(b"a", "a.png", "image/png").unwrap();
        let b = cloud.upload(b"b", "b.png", "image/png").unwrap();
        assert_ne!(a.id, b.id);
    }
}
