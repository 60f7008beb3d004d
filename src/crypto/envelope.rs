//! AES-256-GCM envelope with key-scoped associated data.
//!
//! Every call to `encrypt` draws a fresh random 96-bit IV. The on-disk
//! encoding is `base64(IV || ciphertext || tag)` — a single opaque
//! string the storage layer can treat as text.
//!
//! The AAD convention binds ciphertexts to their slot: record bodies
//! and index-entry fields use the entry id, the vault index root uses
//! the vault version string. Moving a ciphertext between slots fails
//! authentication.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crypto::keys::KEY_LEN;
use crate::errors::CryptoError;

/// Size of the AES-256-GCM IV in bytes.
const IV_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key`, binding `aad`.
///
/// Returns `base64(IV || ciphertext || tag)`.
pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_LEN], aad: &[u8]) -> Result<String, CryptoError> {
    let sealed = seal(plaintext, key, aad)?;
    Ok(BASE64.encode(sealed))
}

/// Decrypt a payload produced by [`encrypt`].
///
/// Any failure — bad base64, short buffer, tag mismatch — surfaces as
/// the single `Tampered` kind.
pub fn decrypt(payload: &str, key: &[u8; KEY_LEN], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let raw = BASE64.decode(payload).map_err(|_| CryptoError::Tampered)?;
    open(&raw, key, aad)
}

/// Binary form of [`encrypt`]: `IV || ciphertext || tag`, no base64.
///
/// Used where the envelope feeds the fragmenter rather than a JSON
/// field.
pub fn seal(plaintext: &[u8], key: &[u8; KEY_LEN], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Tampered)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Tampered)?;

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Binary counterpart of [`decrypt`].
pub fn open(raw: &[u8], key: &[u8; KEY_LEN], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if raw.len() < IV_LEN + TAG_LEN {
        return Err(CryptoError::Tampered);
    }
    let (iv, ciphertext) = raw.split_at(IV_LEN);
    let nonce = Nonce::from_slice(iv);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Tampered)?;
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Tampered)
}

/// Serialize `value` to canonical JSON and encrypt it.
pub fn encrypt_object<T: Serialize>(
    value: &T,
    key: &[u8; KEY_LEN],
    aad: &[u8],
) -> Result<String, CryptoError> {
    let json = serde_json::to_vec(value).map_err(|_| CryptoError::Tampered)?;
    encrypt(&json, key, aad)
}

/// Decrypt a payload and deserialize the JSON plaintext.
pub fn decrypt_object<T: DeserializeOwned>(
    payload: &str,
    key: &[u8; KEY_LEN],
    aad: &[u8],
) -> Result<T, CryptoError> {
    let plaintext = decrypt(payload, key, aad)?;
    serde_json::from_slice(&plaintext).map_err(|_| CryptoError::Tampered)
}
