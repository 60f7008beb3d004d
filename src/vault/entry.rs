//! Entry model and validators.
//!
//! Entries exist in plaintext only in memory. The on-disk record body
//! is the canonical JSON of [`RecordBody`] sealed inside the AEAD
//! envelope; the tagged representation keeps the format forward
//! compatible.

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Result, VaultError};

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 256;
/// Maximum category length in characters.
pub const MAX_CATEGORY_LEN: usize = 64;
/// Maximum username length in characters.
pub const MAX_USERNAME_LEN: usize = 256;
/// Maximum password length in characters.
pub const MAX_PASSWORD_LEN: usize = 4096;
/// Maximum URL length in characters.
pub const MAX_URL_LEN: usize = 2048;
/// Maximum credential-notes length in characters.
pub const MAX_NOTES_LEN: usize = 65_536;
/// Maximum note content length in bytes (1 MiB).
pub const MAX_CONTENT_LEN: usize = 1024 * 1024;

/// What kind of record an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Credential,
    Note,
    File,
}

/// Plaintext entry metadata handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: Uuid,
    pub kind: EntryKind,
    pub title: String,
    #[serde(with = "ts_milliseconds")]
    pub created: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Secret fields of a credential entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Metadata describing a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub original_name: String,
    pub mime: String,
    pub size: u64,
    /// SHA-256 of the plaintext file body, as 64 hex chars.
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The encrypted-at-rest record body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordBody {
    Credential(CredentialFields),
    Note { content: String },
    File(FileMetadata),
}

impl RecordBody {
    pub fn kind(&self) -> EntryKind {
        match self {
            RecordBody::Credential(_) => EntryKind::Credential,
            RecordBody::Note { .. } => EntryKind::Note,
            RecordBody::File(_) => EntryKind::File,
        }
    }
}

/// A decrypted record: entry metadata plus its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub entry: Entry,
    pub body: RecordBody,
}

/// Lightweight listing row: decrypted title plus indexed metadata.
///
/// Returned by `list` and `search`; exists only in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub id: Uuid,
    pub title: String,
    pub kind: EntryKind,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub favorite: bool,
    pub category: Option<String>,
}

/// Fields an `update` may change. `None` leaves a field untouched.
///
/// Applies to credentials and notes; file entries are immutable via
/// this path.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub category: Option<Option<String>>,
    pub username: Option<Option<String>>,
    pub password: Option<Option<String>>,
    pub url: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub content: Option<String>,
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(VaultError::InvalidEntry(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok(())
}

/// Validate a title: 1–256 characters.
pub fn validate_title(title: &str) -> Result<()> {
    if title.is_empty() {
        return Err(VaultError::InvalidEntry("title cannot be empty".into()));
    }
    check_len("title", title, MAX_TITLE_LEN)
}

/// Validate an optional category: at most 64 characters.
pub fn validate_category(category: Option<&str>) -> Result<()> {
    match category {
        Some(c) => check_len("category", c, MAX_CATEGORY_LEN),
        None => Ok(()),
    }
}

/// A minimal well-formedness check: `scheme://rest`, ASCII scheme,
/// non-empty remainder, no whitespace or control characters.
fn url_is_well_formed(url: &str) -> bool {
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let Some((scheme, rest)) = url.split_once("://") else {
        return false;
    };
    !scheme.is_empty()
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && !rest.is_empty()
}

/// Validate credential fields against their length and format limits.
pub fn validate_credential(fields: &CredentialFields) -> Result<()> {
    if let Some(username) = &fields.username {
        check_len("username", username, MAX_USERNAME_LEN)?;
    }
    if let Some(password) = &fields.password {
        check_len("password", password, MAX_PASSWORD_LEN)?;
    }
    if let Some(url) = &fields.url {
        check_len("url", url, MAX_URL_LEN)?;
        if !url_is_well_formed(url) {
            return Err(VaultError::InvalidEntry(format!("malformed url: {url}")));
        }
    }
    if let Some(notes) = &fields.notes {
        check_len("notes", notes, MAX_NOTES_LEN)?;
    }
    Ok(())
}

/// Validate note content: at most 1 MiB.
pub fn validate_note_content(content: &str) -> Result<()> {
    if content.len() > MAX_CONTENT_LEN {
        return Err(VaultError::InvalidEntry(
            "note content exceeds 1 MiB".into(),
        ));
    }
    Ok(())
}
