//! The persisted vault record and its key-value layout.
//!
//! A vault is three byte fields stored under fixed keys:
//!
//! ```text
//! { "vault_salt": <base64>, "vault_iv": <base64>, "vault_data": <base64> }
//! ```
//!
//! - **vault_salt**: 16-byte PBKDF2 salt, written once at creation.
//! - **vault_iv**: 12-byte AES-GCM IV of the current ciphertext.
//! - **vault_data**: the AES-GCM ciphertext (document JSON + auth tag).
//!
//! The vault exists only when all three keys are present.

use serde::{Deserialize, Serialize};

use crate::crypto::{IV_LEN, SALT_LEN};
use crate::errors::{FormVaultError, Result};

/// Storage key for the salt.
pub const SALT_FIELD: &str = "vault_salt";
/// Storage key for the IV.
pub const IV_FIELD: &str = "vault_iv";
/// Storage key for the ciphertext.
pub const DATA_FIELD: &str = "vault_data";

/// A complete vault as read from or written to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRecord {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

/// The raw key-value fields as they sit in storage.
///
/// Each field is optional so that a partially written or hand-edited
/// store can be loaded and reported as "no vault" instead of failing
/// to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredFields {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_opt")]
    pub vault_salt: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_opt")]
    pub vault_iv: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_opt")]
    pub vault_data: Option<Vec<u8>>,
}

impl StoredFields {
    /// `true` iff salt, IV and ciphertext are all present.
    pub fn is_complete(&self) -> bool {
        self.vault_salt.is_some() && self.vault_iv.is_some() && self.vault_data.is_some()
    }

    /// Convert into a `VaultRecord`, checking field lengths.
    ///
    /// Returns `NoVault` when any field is missing.
    pub fn into_record(self) -> Result<VaultRecord> {
        let (Some(salt), Some(iv), Some(ciphertext)) =
            (self.vault_salt, self.vault_iv, self.vault_data)
        else {
            return Err(FormVaultError::NoVault);
        };

        let salt: [u8; SALT_LEN] = salt.as_slice().try_into().map_err(|_| {
            FormVaultError::InvalidVaultFormat(format!(
                "{SALT_FIELD} must be {SALT_LEN} bytes, got {}",
                salt.len()
            ))
        })?;
        let iv: [u8; IV_LEN] = iv.as_slice().try_into().map_err(|_| {
            FormVaultError::InvalidVaultFormat(format!(
                "{IV_FIELD} must be {IV_LEN} bytes, got {}",
                iv.len()
            ))
        })?;

        Ok(VaultRecord {
            salt,
            iv,
            ciphertext,
        })
    }
}

impl From<&VaultRecord> for StoredFields {
    fn from(record: &VaultRecord) -> Self {
        Self {
            vault_salt: Some(record.salt.to_vec()),
            vault_iv: Some(record.iv.to_vec()),
            vault_data: Some(record.ciphertext.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers for optional base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

mod base64_opt {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match data {
            Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| BASE64.decode(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
