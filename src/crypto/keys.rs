//! Key hierarchy: HKDF-SHA256 subkeys and the in-memory key holder.
//!
//! From the Argon2id master key three labeled subkeys are always derived
//! at unlock:
//!
//! - `"slasshy-index-key"`    — seals the vault index root
//! - `"slasshy-entry-key"`    — seals record bodies and blobs
//! - `"slasshy-metadata-key"` — seals titles, tokens, and configs
//!
//! HKDF uses the master key directly as the pseudo-random key with an
//! empty salt — the master already went through a salted, memory-hard
//! KDF. The `info` parameter is the label, which binds each subkey to
//! its purpose.

use std::time::{Duration, Instant};

use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::primitives::{constant_time_eq, sha256};
use crate::errors::{AuthError, CryptoError};

/// Length of every key in the hierarchy (256 bits).
pub const KEY_LEN: usize = 32;

/// HKDF label for the index key.
pub const INDEX_KEY_LABEL: &str = "slasshy-index-key";

/// HKDF label for the entry key.
pub const ENTRY_KEY_LABEL: &str = "slasshy-entry-key";

/// HKDF label for the metadata key.
pub const METADATA_KEY_LABEL: &str = "slasshy-metadata-key";

/// Which key in the hierarchy an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Master,
    Index,
    Entry,
    Metadata,
}

/// Derive a labeled 32-byte subkey from the master key.
pub fn derive_subkey(master: &[u8; KEY_LEN], label: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, master);
    let mut okm = [0u8; KEY_LEN];
    hk.expand(label.as_bytes(), &mut okm)
        .map_err(|e| CryptoError::KdfFail(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

/// The verifier persisted beside the vault: SHA-256 of the master key.
///
/// Lets unlock detect a wrong passphrase without providing a decryption
/// oracle. Compared in constant time.
pub fn key_verifier(master: &[u8; KEY_LEN]) -> [u8; 32] {
    sha256(master)
}

/// Constant-time comparison of a candidate master key against a stored
/// verifier.
pub fn verify_master(master: &[u8; KEY_LEN], stored_verifier: &[u8]) -> bool {
    constant_time_eq(&key_verifier(master), stored_verifier)
}

/// The four keys of an unlocked session.
///
/// Wiped (random overwrite, then zeros) on lock and on drop.
struct KeySet {
    master: [u8; KEY_LEN],
    index: [u8; KEY_LEN],
    entry: [u8; KEY_LEN],
    metadata: [u8; KEY_LEN],
}

impl KeySet {
    fn derive(master: [u8; KEY_LEN]) -> Result<Self, CryptoError> {
        let index = derive_subkey(&master, INDEX_KEY_LABEL)?;
        let entry = derive_subkey(&master, ENTRY_KEY_LABEL)?;
        let metadata = derive_subkey(&master, METADATA_KEY_LABEL)?;
        Ok(Self {
            master,
            index,
            entry,
            metadata,
        })
    }

    fn get(&self, role: KeyRole) -> &[u8; KEY_LEN] {
        match role {
            KeyRole::Master => &self.master,
            KeyRole::Index => &self.index,
            KeyRole::Entry => &self.entry,
            KeyRole::Metadata => &self.metadata,
        }
    }

    /// Overwrite each buffer with random bytes, then zeros.
    fn wipe(&mut self) {
        for buf in [
            &mut self.master,
            &mut self.index,
            &mut self.entry,
            &mut self.metadata,
        ] {
            OsRng.fill_bytes(buf);
            buf.zeroize();
        }
    }
}

impl Drop for KeySet {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet").field("keys", &"[REDACTED]").finish()
    }
}

/// In-memory holder for the key hierarchy with auto-expiry.
///
/// Expiry is enforced against a monotonic clock on every access; each
/// successful access resets the timer. A zero timeout disables
/// auto-expiry. After expiry or an explicit [`lock`](Self::lock), every
/// access yields [`AuthError::Locked`].
#[derive(Debug)]
pub struct KeyHolder {
    keys: Option<KeySet>,
    timeout: Duration,
    last_access: Instant,
}

impl KeyHolder {
    /// Create an empty (locked) holder with the given auto-lock timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            keys: None,
            timeout,
            last_access: Instant::now(),
        }
    }

    /// Install a freshly derived master key, deriving the three subkeys.
    ///
    /// Replaces (and wipes) any previously held keys.
    pub fn install(&mut self, master: [u8; KEY_LEN]) -> Result<(), CryptoError> {
        self.keys = Some(KeySet::derive(master)?);
        self.last_access = Instant::now();
        Ok(())
    }

    /// Borrow a key, resetting the expiry timer.
    ///
    /// The returned copy wipes itself on drop; callers must not let it
    /// outlive the current operation.
    pub fn get(&mut self, role: KeyRole) -> Result<Zeroizing<[u8; KEY_LEN]>, AuthError> {
        self.expire_if_idle();
        let keys = self.keys.as_ref().ok_or(AuthError::Locked)?;
        self.last_access = Instant::now();
        Ok(Zeroizing::new(*keys.get(role)))
    }

    /// Wipe and discard all keys.
    pub fn lock(&mut self) {
        // KeySet::drop wipes the buffers in place.
        self.keys = None;
    }

    /// True while keys are held and the timeout has not elapsed.
    pub fn is_unlocked(&mut self) -> bool {
        self.expire_if_idle();
        self.keys.is_some()
    }

    /// Enforce the auto-lock timeout; returns true if it fired.
    pub fn expire_if_idle(&mut self) -> bool {
        if self.keys.is_some()
            && !self.timeout.is_zero()
            && self.last_access.elapsed() >= self.timeout
        {
            self.lock();
            return true;
        }
        false
    }
}
