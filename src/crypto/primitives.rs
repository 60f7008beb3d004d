//! Random and hash primitives.
//!
//! Every random draw in the crate goes through `OsRng`; there is no
//! seedable or predictable source anywhere. Hashing is SHA-256, with an
//! 8-byte truncated form used as the fragment and stego checksum.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::errors::CryptoError;

/// Length of a truncated checksum in bytes.
pub const CHECKSUM_LEN: usize = 8;

/// Fill a fresh buffer with `n` cryptographically random bytes.
pub fn random_bytes(n: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| CryptoError::RngFail(e.to_string()))?;
    Ok(buf)
}

/// Draw a uniformly random integer in `[min, max]` (inclusive).
///
/// Panics if `min > max`; callers pass compile-time-ordered bounds.
pub fn random_int(min: u64, max: u64) -> u64 {
    OsRng.gen_range(min..=max)
}

/// Generate a random v4 UUID.
pub fn uuid_v4() -> Uuid {
    Uuid::new_v4()
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// First 8 bytes of `sha256(data)`.
pub fn checksum8(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let full = sha256(data);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&full[..CHECKSUM_LEN]);
    out
}

/// `checksum8` rendered as 16 lowercase hex characters.
pub fn checksum8_hex(data: &[u8]) -> String {
    hex::encode(checksum8(data))
}

/// Constant-time equality over byte slices.
///
/// Returns `false` immediately when lengths differ — length is treated
/// as non-secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_have_requested_length() {
        let buf = random_bytes(48).unwrap();
        assert_eq!(buf.len(), 48);
    }

    #[test]
    fn random_bytes_differ_between_draws() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn random_int_respects_inclusive_bounds() {
        for _ in 0..200 {
            let v = random_int(3, 7);
            assert!((3..=7).contains(&v));
        }
        assert_eq!(random_int(5, 5), 5);
    }

    #[test]
    fn uuids_are_unique() {
        assert_ne!(uuid_v4(), uuid_v4());
    }

    #[test]
    fn sha256_matches_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn checksum8_is_prefix_of_sha256() {
        let data = b"slasshy";
        assert_eq!(checksum8(data), sha256(data)[..8]);
        assert_eq!(checksum8_hex(data).len(), 16);
    }

    #[test]
    fn constant_time_eq_basic() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
