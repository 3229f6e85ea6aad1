//! The in-memory session key.
//!
//! A `SessionKey` is the 256-bit AES key derived from the master
//! password.  It lives only while the vault is unlocked and zeroes its
//! memory when dropped.
//!
//! The key is exportable: `export` produces a base64 string so the
//! session cache can hold it across independent requests.  This widens
//! the exposure window compared with a key that never leaves the cipher
//! object, so the exported form must only ever go into the ephemeral
//! cache, never into durable storage.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{FormVaultError, Result};

/// Length of the session key in bytes (256 bits, for AES-256).
pub const KEY_LEN: usize = 32;

/// A 32-byte AES-256 key that is zeroized on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SessionKey {
    bytes: [u8; KEY_LEN],
}

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Access the raw key bytes (e.g. to build an AES cipher).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Export the key as standard base64.
    pub fn export(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.bytes))
    }

    /// Rebuild a key from the output of `export`.
    pub fn import(encoded: &str) -> Result<Self> {
        let decoded = Zeroizing::new(
            BASE64
                .decode(encoded)
                .map_err(|e| FormVaultError::InvalidKey(format!("not valid base64: {e}")))?,
        );

        let bytes: [u8; KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            FormVaultError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                decoded.len()
            ))
        })?;

        Ok(Self { bytes })
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for SessionKey {}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
