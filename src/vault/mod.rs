//! Vault module: the persisted encrypted record.
//!
//! This module provides:
//! - `VaultRecord` and its base64 key-value layout (`record`)
//! - The `VaultStore` persistence trait with file and memory backends (`store`)

pub mod record;
pub mod store;

// Re-export the most commonly used items.
pub use record::{StoredFields, VaultRecord};
pub use store::{FileVaultStore, MemoryVaultStore, VaultStore};
