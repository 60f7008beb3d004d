//! Core configuration, loaded from `slasshy.toml`.
//!
//! Every field has a default so the vault works with no config file at
//! all. Unknown keys are ignored; out-of-range values are rejected at
//! load time — in particular, KDF parameters weaker than the defaults
//! never make it past [`Settings::validate`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::KdfParams;
use crate::errors::{Result, VaultError};

/// Carrier format preference for new embeds.
///
/// `jpg` is accepted here for forward compatibility but the codec only
/// implements PNG; selecting it fails at the codec boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierPreference {
    #[default]
    Png,
    Jpg,
}

/// KDF section of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfSettings {
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,
    #[serde(default = "default_memory_cost_kib")]
    pub memory_cost_kib: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    #[serde(default = "default_hash_length")]
    pub hash_length: u32,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory where the vault lives.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: PathBuf,

    /// Auto-lock timeout in milliseconds; 0 disables auto-lock.
    #[serde(default = "default_auto_lock_timeout_ms")]
    pub auto_lock_timeout_ms: u64,

    /// Preferred carrier format for new embeds.
    #[serde(default)]
    pub preferred_carrier: CarrierPreference,

    /// Chaff decoys uploaded per real carrier.
    #[serde(default)]
    pub decoy_ratio: u32,

    /// Argon2id parameters.
    #[serde(default)]
    pub kdf: KdfSettings,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_dir() -> PathBuf {
    PathBuf::from(".slasshy")
}

fn default_auto_lock_timeout_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_time_cost() -> u32 {
    3
}

fn default_memory_cost_kib() -> u32 {
    65_536 // 64 MiB
}

fn default_parallelism() -> u32 {
    4
}

fn default_hash_length() -> u32 {
    32
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for KdfSettings {
    fn default() -> Self {
        Self {
            time_cost: default_time_cost(),
            memory_cost_kib: default_memory_cost_kib(),
            parallelism: default_parallelism(),
            hash_length: default_hash_length(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            auto_lock_timeout_ms: default_auto_lock_timeout_ms(),
            preferred_carrier: CarrierPreference::default(),
            decoy_ratio: 0,
            kdf: KdfSettings::default(),
        }
    }
}

impl Settings {
    /// Name of the config file looked for in the project root.
    pub const FILE_NAME: &'static str = "slasshy.toml";

    /// Load settings from `<project_dir>/slasshy.toml`.
    ///
    /// Missing file yields defaults; a present but invalid file is an
    /// error.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::Config(format!("failed to parse {}: {e}", config_path.display()))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        self.kdf_params()
            .validate()
            .map_err(|e| VaultError::Config(e.to_string()))?;
        if self.kdf.hash_length != 32 {
            return Err(VaultError::Config(format!(
                "kdf.hash_length must be 32 (got {})",
                self.kdf.hash_length
            )));
        }
        Ok(())
    }

    /// KDF parameters for the crypto layer.
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            time_cost: self.kdf.time_cost,
            memory_cost_kib: self.kdf.memory_cost_kib,
            parallelism: self.kdf.parallelism,
        }
    }

    /// Auto-lock timeout as a `Duration`; zero disables auto-lock.
    pub fn auto_lock(&self) -> Duration {
        Duration::from_millis(self.auto_lock_timeout_ms)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.vault_dir, PathBuf::from(".slasshy"));
        assert_eq!(s.auto_lock_timeout_ms, 300_000);
        assert_eq!(s.preferred_carrier, CarrierPreference::Png);
        assert_eq!(s.decoy_ratio, 0);
        assert_eq!(s.kdf.memory_cost_kib, 65_536);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.auto_lock_timeout_ms, 300_000);
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
vault_dir = "secrets"
auto_lock_timeout_ms = 60000
preferred_carrier = "png"
decoy_ratio = 2

[kdf]
time_cost = 4
memory_cost_kib = 131072
parallelism = 8
"#;
        fs::write(tmp.path().join("slasshy.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.vault_dir, PathBuf::from("secrets"));
        assert_eq!(settings.auto_lock_timeout_ms, 60_000);
        assert_eq!(settings.decoy_ratio, 2);
        assert_eq!(settings.kdf.time_cost, 4);
        assert_eq!(settings.kdf.memory_cost_kib, 131_072);
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("slasshy.toml"), "decoy_ratio = 1\n").unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.decoy_ratio, 1);
        assert_eq!(settings.auto_lock_timeout_ms, 300_000);
        assert_eq!(settings.kdf.parallelism, 4);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("slasshy.toml"),
            "future_option = true\ndecoy_ratio = 3\n",
        )
        .unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.decoy_ratio, 3);
    }

    #[test]
    fn weak_kdf_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("slasshy.toml"),
            "[kdf]\nmemory_cost_kib = 1024\n",
        )
        .unwrap();

        assert!(matches!(
            Settings::load(tmp.path()),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn wrong_hash_length_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("slasshy.toml"), "[kdf]\nhash_length = 64\n").unwrap();

        assert!(matches!(
            Settings::load(tmp.path()),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("slasshy.toml"), "not valid {{toml").unwrap();
        assert!(Settings::load(tmp.path()).is_err());
    }
}
