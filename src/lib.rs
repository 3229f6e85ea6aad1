//! Password-protected profile vault with a locked/unlocked session
//! lifecycle.
//!
//! Start with [`VaultManager`] for typed access, or [`protocol::handle`]
//! for the command protocol used by UI surfaces.

pub mod config;
pub mod crypto;
pub mod errors;
pub mod manager;
pub mod profile;
pub mod protocol;
pub mod session;
pub mod vault;

pub use errors::{FormVaultError, Result};
pub use manager::{VaultManager, VaultState, VaultStatus};
pub use profile::{Profile, VaultDocument};
pub use session::SessionKeyCache;
