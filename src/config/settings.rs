use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clipboard::DEFAULT_CLEAR_AFTER;
use crate::crypto::hybrid::DEFAULT_RSA_BITS;
use crate::crypto::kdf::{KeyDerivationManager, CURRENT_KDF_VERSION, KDF_V1, KDF_V2};
use crate::errors::{Result, VaultCoreError};
use crate::offline::DEFAULT_MAX_ATTEMPTS;
use crate::provision::DEFAULT_PROVISION_ATTEMPTS;
#[cfg(feature = "sqlite-store")]
use crate::storage::SqliteStore;

/// Client configuration, loaded from `zkvault.toml`.
///
/// Every field has a default so the core works without any config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// KDF version used for new credentials and upgrades (default: 2).
    #[serde(default = "default_kdf_version")]
    pub kdf_version: u32,

    /// RSA modulus for newly generated hybrid key pairs (default: 4096).
    #[serde(default = "default_rsa_modulus_bits")]
    pub rsa_modulus_bits: usize,

    /// Failed replays before a queued mutation is dead-lettered (default: 5).
    #[serde(default = "default_sync_max_attempts")]
    pub sync_max_attempts: u32,

    /// Seconds before a copied secret is cleared (default: 30).
    #[serde(default = "default_clipboard_clear_secs")]
    pub clipboard_clear_secs: u64,

    /// Local cache database, relative to the data directory.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,

    /// Read/insert rounds when provisioning a key pair (default: 3).
    #[serde(default = "default_key_provision_attempts")]
    pub key_provision_attempts: u32,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_kdf_version() -> u32 {
    CURRENT_KDF_VERSION
}

fn default_rsa_modulus_bits() -> usize {
    DEFAULT_RSA_BITS
}

fn default_sync_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_clipboard_clear_secs() -> u64 {
    DEFAULT_CLEAR_AFTER.as_secs()
}

fn default_cache_path() -> String {
    "zkvault-cache.db".to_string()
}

fn default_key_provision_attempts() -> u32 {
    DEFAULT_PROVISION_ATTEMPTS
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            kdf_version: default_kdf_version(),
            rsa_modulus_bits: default_rsa_modulus_bits(),
            sync_max_attempts: default_sync_max_attempts(),
            clipboard_clear_secs: default_clipboard_clear_secs(),
            cache_path: default_cache_path(),
            key_provision_attempts: default_key_provision_attempts(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the data directory.
    const FILE_NAME: &'static str = "zkvault.toml";

    /// Load settings from `<data_dir>/zkvault.toml`.
    ///
    /// If the file does not exist, defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultCoreError::Config(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Full path to the local cache database.
    ///
    /// Example: `data_dir/zkvault-cache.db`
    pub fn cache_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.cache_path)
    }

    /// Open the cache database at `cache_path`, creating its directory
    /// if needed.
    #[cfg(feature = "sqlite-store")]
    pub fn open_cache(&self, data_dir: &Path) -> Result<SqliteStore> {
        let path = self.cache_path(data_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        SqliteStore::open(&path)
    }

    pub fn clipboard_clear_after(&self) -> Duration {
        Duration::from_secs(self.clipboard_clear_secs)
    }

    /// A KDF manager over the built-in version table, deriving new
    /// credentials at `kdf_version`.
    pub fn key_derivation_manager(&self) -> Result<KeyDerivationManager> {
        let versions = BTreeMap::from([(1, KDF_V1), (2, KDF_V2)]);
        KeyDerivationManager::with_versions(versions, self.kdf_version)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
