//! AES-256-GCM authenticated encryption.
//!
//! Each call to `encrypt` generates a fresh random 12-byte IV and
//! returns it next to the ciphertext.  The vault stores the two in
//! separate fields, so unlike a single-blob layout nothing is prepended.
//!
//! The returned ciphertext carries the 16-byte auth tag at its end.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};

use super::keys::SessionKey;
use crate::errors::{FormVaultError, Result};

/// Size of the AES-256-GCM IV in bytes.
pub const IV_LEN: usize = 12;

/// Encrypt `plaintext` under `key` with a fresh random IV.
///
/// Returns `(iv, ciphertext)`.  The IV is never reused: every call draws
/// a new one from the OS RNG, including repeated saves of the same data.
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<([u8; IV_LEN], Vec<u8>)> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| FormVaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| FormVaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&nonce);
    Ok((iv, ciphertext))
}

/// Decrypt and authenticate `ciphertext` that was produced by `encrypt`.
///
/// Fails with `DecryptionFailed` if the tag does not verify.  A wrong
/// key and tampered bytes look the same at this layer.
pub fn decrypt(key: &SessionKey, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| FormVaultError::DecryptionFailed)?;

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| FormVaultError::DecryptionFailed)
}
