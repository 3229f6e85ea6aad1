use thiserror::Error;

/// All errors that can occur in FormVault.
#[derive(Debug, Error)]
pub enum FormVaultError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Invalid session key: {0}")]
    InvalidKey(String),

    // --- Vault state errors ---
    #[error("No vault found")]
    NoVault,

    #[error("A vault already exists (wipe it before creating a new one)")]
    VaultAlreadyExists,

    #[error("Vault is locked")]
    Locked,

    #[error("Incorrect password")]
    AuthenticationFailed,

    #[error("Vault data is corrupted or has been tampered with: {0}")]
    CorruptData(String),

    #[error("Invalid vault format: {0}")]
    InvalidVaultFormat(String),

    // --- IO errors ---
    #[error("Storage error: {0}")]
    StorageIo(#[from] std::io::Error),

    // --- Data errors ---
    #[error("Invalid profile data: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),
}

impl FormVaultError {
    /// Stable machine-readable code reported to protocol callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoVault => "NO_VAULT",
            Self::Locked => "LOCKED",
            Self::AuthenticationFailed => "WRONG_PASSWORD",
            Self::CorruptData(_) | Self::DecryptionFailed | Self::InvalidVaultFormat(_) => {
                "DECRYPT_FAILED"
            }
            Self::VaultAlreadyExists => "VAULT_EXISTS",
            Self::Validation(_) => "INVALID_PROFILE",
            Self::StorageIo(_) => "STORAGE_ERROR",
            Self::EncryptionFailed(_)
            | Self::KeyDerivationFailed(_)
            | Self::InvalidKey(_)
            | Self::SerializationError(_)
            | Self::ConfigError(_) => "INTERNAL_ERROR",
        }
    }
}

/// Convenience type alias for FormVault results.
pub type Result<T> = std::result::Result<T, FormVaultError>;
