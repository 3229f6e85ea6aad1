//! The vault session manager.
//!
//! `VaultManager` ties the store, the KDF, the cipher and the session
//! cache together and enforces the `NoVault` / `Locked` / `Unlocked`
//! state machine:
//!
//! ```text
//!   NoVault --create_vault--> Unlocked <--unlock-- Locked
//!      ^                         |                   ^
//!      +---------wipe------------+-------lock--------+
//! ```
//!
//! Every operation takes the vault's operation lock for its whole
//! duration, so read-modify-write sequences (`update_document` and the
//! profile helpers) can never interleave with each other or with a state
//! transition.  The lock lives in the shared [`SessionKeyCache`], so it
//! holds across every manager built over the same cache.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::crypto::{decrypt, derive_key, encrypt, generate_salt, KdfParams, SessionKey, SALT_LEN};
use crate::errors::{FormVaultError, Result};
use crate::profile::{self, Profile, VaultDocument};
use crate::session::SessionKeyCache;
use crate::vault::{FileVaultStore, VaultRecord, VaultStore};

/// Where the vault currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// Nothing persisted.
    NoVault,
    /// Persisted, no key cached.
    Locked,
    /// Persisted, key cached.
    Unlocked,
}

/// Summary reported to UI callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultStatus {
    pub has_vault: bool,
    pub locked: bool,
}

/// Orchestrates create / unlock / lock / read / write / wipe.
pub struct VaultManager<S> {
    store: S,
    cache: Arc<SessionKeyCache>,
    kdf: KdfParams,
}

impl VaultManager<FileVaultStore> {
    /// Build a manager over the file vault described by `settings`,
    /// relative to `dir`.
    pub fn open(dir: &Path, settings: &Settings, cache: Arc<SessionKeyCache>) -> Self {
        let store = FileVaultStore::new(settings.vault_path(dir));
        Self::new(store, cache, settings.kdf_params())
    }
}

impl<S: VaultStore> VaultManager<S> {
    pub fn new(store: S, cache: Arc<SessionKeyCache>, kdf: KdfParams) -> Self {
        Self { store, cache, kdf }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The session cache shared with other handlers.  It also carries
    /// the operation lock, so managers over one vault must share it.
    pub fn cache(&self) -> &Arc<SessionKeyCache> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// The current state, derived from the store and the cache.
    pub async fn state(&self) -> Result<VaultState> {
        let _guard = self.cache.exclusive().await;
        self.current_state().await
    }

    /// Whether a vault exists and whether a key is cached.
    pub async fn status(&self) -> Result<VaultStatus> {
        let _guard = self.cache.exclusive().await;
        Ok(VaultStatus {
            has_vault: self.vault_present().await?,
            locked: !self.cache.is_populated(),
        })
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Create a new vault holding `document` and leave it unlocked.
    ///
    /// Refuses to overwrite an existing vault; `wipe` it first.
    pub async fn create_vault(&self, password: &str, document: &VaultDocument) -> Result<()> {
        let _guard = self.cache.exclusive().await;

        Self::require_password(password)?;
        if self.vault_present().await? {
            return Err(FormVaultError::VaultAlreadyExists);
        }
        profile::validate_profiles(&document.profiles)?;

        let salt = generate_salt();
        let key = self.derive(password, salt).await?;

        let plaintext = Self::serialize(document)?;
        let (iv, ciphertext) = encrypt(&key, &plaintext)?;

        self.store
            .write(&VaultRecord {
                salt,
                iv,
                ciphertext,
            })
            .await?;
        self.cache.set(&key);

        info!(profiles = document.profiles.len(), "vault created");
        Ok(())
    }

    /// Unlock the vault with `password`.
    ///
    /// On a wrong password the state stays `Locked` and the cache is not
    /// touched.
    ///
    /// If a key is already cached this is a no-op and `password` is **not
    /// verified**: the cached key is trusted for the rest of the session.
    /// Callers that need to confirm the password must `lock` first.
    ///
    /// A stored record that cannot be parsed fails with `CorruptData`.
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let _guard = self.cache.exclusive().await;

        Self::require_password(password)?;
        match self.current_state().await? {
            VaultState::NoVault => return Err(FormVaultError::NoVault),
            VaultState::Unlocked => {
                debug!("unlock requested while already unlocked");
                return Ok(());
            }
            VaultState::Locked => {}
        }

        let record = self.store.read().await.map_err(format_as_corrupt)?;
        let key = self.derive(password, record.salt).await?;

        let plaintext = match decrypt(&key, &record.iv, &record.ciphertext) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(FormVaultError::DecryptionFailed) => {
                warn!("unlock failed: incorrect password");
                return Err(FormVaultError::AuthenticationFailed);
            }
            Err(e) => return Err(e),
        };
        Self::deserialize(&plaintext)?;

        self.cache.set(&key);
        info!("vault unlocked");
        Ok(())
    }

    /// Forget the session key.
    pub async fn lock(&self) {
        let _guard = self.cache.exclusive().await;
        self.cache.clear();
        info!("vault locked");
    }

    /// Delete the persisted vault and forget the session key.
    pub async fn wipe(&self) -> Result<()> {
        let _guard = self.cache.exclusive().await;
        self.store.clear().await?;
        self.cache.clear();
        info!("vault wiped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Document access (requires Unlocked)
    // ------------------------------------------------------------------

    /// Decrypt and return the whole document.
    pub async fn document(&self) -> Result<VaultDocument> {
        let _guard = self.cache.exclusive().await;
        let key = self.unlocked_key().await?;
        self.read_document(&key).await
    }

    /// Encrypt `document` under a fresh IV and replace the stored one.
    pub async fn save_document(&self, document: &VaultDocument) -> Result<()> {
        let _guard = self.cache.exclusive().await;
        let key = self.unlocked_key().await?;
        self.write_document(&key, document).await
    }

    /// Read the document, let `f` mutate it, and save the result, all
    /// under one hold of the operation lock.
    ///
    /// If `f` fails nothing is written.
    pub async fn update_document<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut VaultDocument) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.cache.exclusive().await;
        let key = self.unlocked_key().await?;
        let mut document = self.read_document(&key).await?;
        let output = f(&mut document)?;
        self.write_document(&key, &document).await?;
        Ok(output)
    }

    // ------------------------------------------------------------------
    // Profile helpers
    // ------------------------------------------------------------------

    /// All stored profiles.
    pub async fn profiles(&self) -> Result<Vec<Profile>> {
        Ok(self.document().await?.profiles)
    }

    /// Replace the profile list, keeping any other document fields.
    pub async fn save_profiles(&self, profiles: Vec<Profile>) -> Result<()> {
        self.update_document(move |doc| {
            doc.profiles = profiles;
            Ok(())
        })
        .await
    }

    /// Insert `profile`, or replace the one with the same id.
    pub async fn upsert_profile(&self, profile: Profile) -> Result<()> {
        profile::validate_profile(&profile)?;
        self.update_document(move |doc| {
            profile::upsert_profile(&mut doc.profiles, profile);
            Ok(())
        })
        .await
    }

    /// Remove the profile with `id`.  Returns `false` if none matched,
    /// in which case nothing is rewritten.
    pub async fn delete_profile(&self, id: &str) -> Result<bool> {
        let _guard = self.cache.exclusive().await;
        let key = self.unlocked_key().await?;
        let mut document = self.read_document(&key).await?;
        if !profile::remove_profile(&mut document.profiles, id) {
            return Ok(false);
        }
        self.write_document(&key, &document).await?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Internals (callers hold the operation lock)
    // ------------------------------------------------------------------

    /// Like `store.has_vault`, except that a record which exists but
    /// cannot be parsed counts as present.  Reading it then fails with
    /// `CorruptData`, and `create_vault` will not overwrite it.
    async fn vault_present(&self) -> Result<bool> {
        match self.store.has_vault().await {
            Err(FormVaultError::InvalidVaultFormat(msg)) => {
                warn!(error = %msg, "stored vault record is unreadable");
                Ok(true)
            }
            other => other,
        }
    }

    async fn current_state(&self) -> Result<VaultState> {
        if !self.vault_present().await? {
            return Ok(VaultState::NoVault);
        }
        if self.cache.is_populated() {
            Ok(VaultState::Unlocked)
        } else {
            Ok(VaultState::Locked)
        }
    }

    async fn unlocked_key(&self) -> Result<SessionKey> {
        match self.current_state().await? {
            VaultState::NoVault => Err(FormVaultError::NoVault),
            VaultState::Locked => Err(FormVaultError::Locked),
            VaultState::Unlocked => self.cache.get()?.ok_or(FormVaultError::Locked),
        }
    }

    /// Decrypt with a key that already passed the password check, so any
    /// authentication failure means the stored bytes are damaged.
    async fn read_document(&self, key: &SessionKey) -> Result<VaultDocument> {
        let record = self.store.read().await.map_err(format_as_corrupt)?;

        let plaintext = match decrypt(key, &record.iv, &record.ciphertext) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(FormVaultError::DecryptionFailed) => {
                warn!("stored vault failed to authenticate under the session key");
                return Err(FormVaultError::CorruptData(
                    "authentication tag mismatch".into(),
                ));
            }
            Err(e) => return Err(e),
        };

        Self::deserialize(&plaintext)
    }

    async fn write_document(&self, key: &SessionKey, document: &VaultDocument) -> Result<()> {
        profile::validate_profiles(&document.profiles)?;

        let plaintext = Self::serialize(document)?;
        let (iv, ciphertext) = encrypt(key, &plaintext)?;
        self.store.update(&iv, &ciphertext).await?;

        debug!(profiles = document.profiles.len(), "vault document saved");
        Ok(())
    }

    /// Run PBKDF2 on the blocking pool.  Nothing is cached here, so a
    /// caller that drops the future mid-derivation changes no state.
    async fn derive(&self, password: &str, salt: [u8; SALT_LEN]) -> Result<SessionKey> {
        let password = Zeroizing::new(password.as_bytes().to_vec());
        let params = self.kdf;

        tokio::task::spawn_blocking(move || derive_key(&password, &salt, &params))
            .await
            .map_err(|e| FormVaultError::KeyDerivationFailed(format!("derivation task failed: {e}")))?
    }

    fn require_password(password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(FormVaultError::Validation("password cannot be empty".into()));
        }
        Ok(())
    }

    fn serialize(document: &VaultDocument) -> Result<Zeroizing<Vec<u8>>> {
        serde_json::to_vec(document)
            .map(Zeroizing::new)
            .map_err(|e| FormVaultError::SerializationError(format!("document: {e}")))
    }

    fn deserialize(plaintext: &[u8]) -> Result<VaultDocument> {
        serde_json::from_slice(plaintext)
            .map_err(|e| FormVaultError::CorruptData(format!("document JSON: {e}")))
    }
}

/// A record that cannot even be parsed is damaged data, not a storage
/// fault.
fn format_as_corrupt(e: FormVaultError) -> FormVaultError {
    match e {
        FormVaultError::InvalidVaultFormat(msg) => FormVaultError::CorruptData(msg),
        other => other,
    }
}

impl<S> std::fmt::Debug for VaultManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultManager")
            .field("cache", &self.cache)
            .field("kdf", &self.kdf)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{MemoryVaultStore, StoredFields};

    const FAST: KdfParams = KdfParams { iterations: 1_000 };

    fn manager() -> VaultManager<MemoryVaultStore> {
        VaultManager::new(
            MemoryVaultStore::new(),
            Arc::new(SessionKeyCache::new()),
            FAST,
        )
    }

    #[tokio::test]
    async fn fresh_manager_has_no_vault() {
        let m = manager();
        assert_eq!(m.state().await.unwrap(), VaultState::NoVault);
        assert_eq!(
            m.status().await.unwrap(),
            VaultStatus {
                has_vault: false,
                locked: true
            }
        );
    }

    #[tokio::test]
    async fn create_leaves_vault_unlocked() {
        let m = manager();
        m.create_vault("pw", &VaultDocument::default()).await.unwrap();
        assert_eq!(m.state().await.unwrap(), VaultState::Unlocked);
        assert!(m.cache().is_populated());
    }

    #[tokio::test]
    async fn create_twice_is_refused() {
        let m = manager();
        m.create_vault("pw", &VaultDocument::default()).await.unwrap();
        let second = m.create_vault("other", &VaultDocument::default()).await;
        assert!(matches!(second, Err(FormVaultError::VaultAlreadyExists)));
    }

    #[tokio::test]
    async fn empty_password_is_rejected() {
        let m = manager();
        let result = m.create_vault("", &VaultDocument::default()).await;
        assert!(matches!(result, Err(FormVaultError::Validation(_))));
        assert_eq!(m.state().await.unwrap(), VaultState::NoVault);
    }

    #[tokio::test]
    async fn unlock_while_unlocked_skips_derivation() {
        let m = manager();
        m.create_vault("pw", &VaultDocument::default()).await.unwrap();
        // The cached key is trusted; the supplied password is not checked.
        m.unlock("anything").await.unwrap();
        assert_eq!(m.state().await.unwrap(), VaultState::Unlocked);
    }

    #[tokio::test]
    async fn cached_key_with_tampered_data_is_corruption() {
        let m = manager();
        m.create_vault("pw", &VaultDocument::default()).await.unwrap();

        let mut fields = m.store().fields();
        if let Some(data) = fields.vault_data.as_mut() {
            data[0] ^= 0xFF;
        }
        m.store().set_fields(fields);

        assert!(matches!(
            m.document().await,
            Err(FormVaultError::CorruptData(_))
        ));
    }

    #[tokio::test]
    async fn tampered_data_on_unlock_reads_as_wrong_password() {
        let m = manager();
        m.create_vault("pw", &VaultDocument::default()).await.unwrap();
        m.lock().await;

        let mut fields = m.store().fields();
        if let Some(data) = fields.vault_data.as_mut() {
            data[0] ^= 0xFF;
        }
        m.store().set_fields(fields);

        assert!(matches!(
            m.unlock("pw").await,
            Err(FormVaultError::AuthenticationFailed)
        ));
    }

    #[tokio::test]
    async fn bad_salt_length_is_corruption() {
        let m = manager();
        m.create_vault("pw", &VaultDocument::default()).await.unwrap();
        m.lock().await;

        let mut fields = m.store().fields();
        fields.vault_salt = Some(vec![0u8; 4]);
        m.store().set_fields(fields);

        assert!(matches!(
            m.unlock("pw").await,
            Err(FormVaultError::CorruptData(_))
        ));
    }

    #[tokio::test]
    async fn unparsable_vault_file_reads_as_corrupt() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        std::fs::write(&path, r#"{"vault_salt": 5}"#).unwrap();
        let m = VaultManager::new(
            crate::vault::FileVaultStore::new(&path),
            Arc::new(SessionKeyCache::new()),
            FAST,
        );

        assert_eq!(
            m.status().await.unwrap(),
            VaultStatus {
                has_vault: true,
                locked: true
            }
        );
        assert_eq!(m.state().await.unwrap(), VaultState::Locked);
        assert!(matches!(
            m.unlock("pw").await,
            Err(FormVaultError::CorruptData(_))
        ));
        assert!(matches!(
            m.create_vault("pw", &VaultDocument::default()).await,
            Err(FormVaultError::VaultAlreadyExists)
        ));

        // Wiping clears the damaged record.
        m.wipe().await.unwrap();
        assert_eq!(m.state().await.unwrap(), VaultState::NoVault);
    }

    #[tokio::test]
    async fn partial_record_counts_as_no_vault() {
        let m = manager();
        m.store().set_fields(StoredFields {
            vault_salt: Some(vec![0u8; SALT_LEN]),
            ..StoredFields::default()
        });
        assert_eq!(m.state().await.unwrap(), VaultState::NoVault);
        assert!(matches!(m.unlock("pw").await, Err(FormVaultError::NoVault)));
    }

    #[tokio::test]
    async fn failed_update_closure_writes_nothing() {
        let m = manager();
        m.create_vault("pw", &VaultDocument::default()).await.unwrap();
        let before = m.store().fields().vault_iv;

        let result: Result<()> = m
            .update_document(|doc| {
                doc.profiles.push(Profile::new("discarded"));
                Err(FormVaultError::Validation("abort".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(m.store().fields().vault_iv, before);
        assert!(m.profiles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_profile_does_not_rewrite() {
        let m = manager();
        m.create_vault("pw", &VaultDocument::default()).await.unwrap();
        let before = m.store().fields().vault_iv;

        assert!(!m.delete_profile("nope").await.unwrap());
        assert_eq!(m.store().fields().vault_iv, before);
    }
}
