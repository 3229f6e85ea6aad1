//! Cryptographic primitives for FormVault.
//!
//! This module provides:
//! - AES-256-GCM encryption and decryption (`encryption`)
//! - PBKDF2-HMAC-SHA256 password-based key derivation (`kdf`)
//! - The exportable, zeroize-on-drop session key (`keys`)

pub mod encryption;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, derive_key, ...};
pub use encryption::{decrypt, encrypt, IV_LEN};
pub use kdf::{derive_key, generate_salt, KdfParams, SALT_LEN};
pub use keys::{SessionKey, KEY_LEN};
