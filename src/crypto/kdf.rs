//! Password-based key derivation using PBKDF2-HMAC-SHA256.
//!
//! The salt is generated once per vault and stored next to the
//! ciphertext.  The iteration count is configurable through
//! `KdfParams` (loaded from `.formvault.toml` or sensible defaults).

use hmac::Hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use super::keys::{SessionKey, KEY_LEN};
use crate::errors::{FormVaultError, Result};

/// Length of the salt in bytes (128 bits).
pub const SALT_LEN: usize = 16;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Minimum accepted iteration count.
const MIN_ITERATIONS: u32 = 1_000;

/// Configurable PBKDF2 parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Number of HMAC-SHA256 rounds (default: 100 000).
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Derive a 32-byte AES key from a password and salt.
///
/// The same password + salt + params always produce the same key.  A
/// wrong password is not an error here: it simply yields a key that will
/// fail to authenticate the stored ciphertext.
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN], params: &KdfParams) -> Result<SessionKey> {
    if params.iterations < MIN_ITERATIONS {
        return Err(FormVaultError::KeyDerivationFailed(format!(
            "PBKDF2 iterations must be at least {MIN_ITERATIONS} (got {})",
            params.iterations
        )));
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, params.iterations, &mut key)
        .map_err(|e| FormVaultError::KeyDerivationFailed(format!("PBKDF2 failed: {e}")))?;

    let session_key = SessionKey::from_bytes(key);
    key.zeroize();
    Ok(session_key)
}

/// Generate a cryptographically random 16-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}
