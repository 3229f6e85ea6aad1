use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{KdfParams, DEFAULT_ITERATIONS};
use crate::errors::{FormVaultError, Result};

/// Host-level configuration, loaded from `.formvault.toml`.
///
/// Every field has a sensible default so FormVault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// File (relative to the data directory) holding the vault fields.
    #[serde(default = "default_vault_file")]
    pub vault_file: String,

    /// PBKDF2-HMAC-SHA256 iteration count (default: 100 000).
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_file() -> String {
    "vault.json".to_string()
}

fn default_pbkdf2_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_file: default_vault_file(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the data directory.
    const FILE_NAME: &'static str = ".formvault.toml";

    /// Load settings from `<dir>/.formvault.toml`.
    ///
    /// If the file does not exist, defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        toml::from_str(&contents).map_err(|e| {
            FormVaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })
    }

    /// Full path of the vault file, e.g. `dir/vault.json`.
    pub fn vault_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.vault_file)
    }

    /// Convert into crypto-layer KDF params.
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            iterations: self.pbkdf2_iterations,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
