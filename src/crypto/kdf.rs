//! Passphrase-based key derivation using Argon2id.
//!
//! The derived 32-byte master key is the root of the whole key
//! hierarchy. Parameters below the authoritative defaults are rejected
//! outright so a tampered config file cannot silently weaken the vault.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::errors::CryptoError;

/// Length of the Argon2 salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Length of the derived master key in bytes (256 bits, for AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// Minimum (and default) time cost.
const MIN_TIME_COST: u32 = 3;

/// Minimum (and default) memory cost in KiB (64 MiB).
const MIN_MEMORY_KIB: u32 = 65_536;

/// Minimum (and default) parallelism lanes.
const MIN_PARALLELISM: u32 = 4;

/// Argon2id parameters.
///
/// The defaults are authoritative minimums; `derive_master` rejects
/// anything weaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Number of iterations (default: 3).
    pub time_cost: u32,
    /// Memory cost in KiB (default: 65 536 = 64 MiB).
    pub memory_cost_kib: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: MIN_TIME_COST,
            memory_cost_kib: MIN_MEMORY_KIB,
            parallelism: MIN_PARALLELISM,
        }
    }
}

impl KdfParams {
    /// Reject parameters weaker than the authoritative defaults.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.time_cost < MIN_TIME_COST {
            return Err(CryptoError::KdfFail(format!(
                "time_cost must be at least {MIN_TIME_COST} (got {})",
                self.time_cost
            )));
        }
        if self.memory_cost_kib < MIN_MEMORY_KIB {
            return Err(CryptoError::KdfFail(format!(
                "memory_cost_kib must be at least {MIN_MEMORY_KIB} (got {})",
                self.memory_cost_kib
            )));
        }
        if self.parallelism < MIN_PARALLELISM {
            return Err(CryptoError::KdfFail(format!(
                "parallelism must be at least {MIN_PARALLELISM} (got {})",
                self.parallelism
            )));
        }
        Ok(())
    }
}

/// Derive the 32-byte master key from a passphrase and salt.
///
/// Deterministic: the same passphrase + salt + params always produce the
/// same key.
pub fn derive_master(
    passphrase: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<[u8; MASTER_KEY_LEN], CryptoError> {
    params.validate()?;

    let argon_params = Params::new(
        params.memory_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(MASTER_KEY_LEN),
    )
    .map_err(|e| CryptoError::KdfFail(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = [0u8; MASTER_KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KdfFail(format!("Argon2id hashing failed: {e}")))?;

    Ok(key)
}

/// Generate a cryptographically random 32-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
