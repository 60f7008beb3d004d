//! Cryptographic core.
//!
//! This module provides:
//! - random and hash primitives (`primitives`)
//! - Argon2id passphrase-based key derivation (`kdf`)
//! - the HKDF key hierarchy and in-memory key holder (`keys`)
//! - the AES-256-GCM envelope with AAD binding (`envelope`)

pub mod envelope;
pub mod kdf;
pub mod keys;
pub mod primitives;

pub use envelope::{decrypt, decrypt_object, encrypt, encrypt_object};
pub use kdf::{derive_master, generate_salt, KdfParams};
pub use keys::{derive_subkey, key_verifier, verify_master, KeyHolder, KeyRole};
pub use primitives::{checksum8, checksum8_hex, constant_time_eq, random_bytes, sha256, uuid_v4};
