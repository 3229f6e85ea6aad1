//! Durable persistence of the vault record.
//!
//! `VaultStore` is the seam between the manager and wherever the three
//! vault fields live.  Two implementations ship with the crate:
//!
//! - `FileVaultStore`: a JSON key-value file, written atomically via
//!   temp-file + rename.  It does no locking of its own; the manager
//!   serializes read-modify-write sequences.
//! - `MemoryVaultStore`: an in-process store, useful for tests and for
//!   hosts that provide their own durability.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::record::{StoredFields, VaultRecord};
use crate::crypto::IV_LEN;
use crate::errors::{FormVaultError, Result};

/// Persistence of the salt / IV / ciphertext triple.
///
/// Every mutating method is atomic: after a crash the store holds either
/// the previous record or the new one, never a mix.
#[async_trait]
pub trait VaultStore: Send + Sync {
    /// `true` iff salt, IV and ciphertext are all present.
    async fn has_vault(&self) -> Result<bool>;

    /// Create or overwrite all three fields.
    async fn write(&self, record: &VaultRecord) -> Result<()>;

    /// Replace the IV and ciphertext, leaving the salt untouched.
    ///
    /// Fails with `NoVault` when no complete record is stored.
    async fn update(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<()>;

    /// Load the stored record, or `NoVault`.
    async fn read(&self) -> Result<VaultRecord>;

    /// Remove every persisted vault field.
    async fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FileVaultStore
// ---------------------------------------------------------------------------

/// A vault stored as a small JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileVaultStore {
    path: PathBuf,
}

impl FileVaultStore {
    /// Use the vault file at `path`.  Nothing is touched on disk until
    /// the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the vault file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw fields.  A missing file is an empty set of fields.
    async fn load_fields(&self) -> Result<StoredFields> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoredFields::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data)
            .map_err(|e| FormVaultError::InvalidVaultFormat(format!("vault JSON: {e}")))
    }

    /// Write the fields to disk **atomically**.
    ///
    /// 1. Serialize the fields to JSON.
    /// 2. Write to a uniquely named temp file in the same directory,
    ///    created owner-only, and sync it.
    /// 3. Rename the temp file over the target path.
    ///
    /// The rename ensures readers never see a half-written file.
    async fn store_fields(&self, fields: &StoredFields) -> Result<()> {
        let buf = serde_json::to_vec_pretty(fields)
            .map_err(|e| FormVaultError::SerializationError(format!("vault fields: {e}")))?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &buf))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        debug!(path = %self.path.display(), "vault file written");
        Ok(())
    }
}

fn write_atomic(path: &Path, buf: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let prefix = format!(
        ".{}.",
        path.file_name().unwrap_or_default().to_string_lossy()
    );
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o600));
    }
    let mut tmp = builder.tempfile_in(parent)?;

    tmp.write_all(buf)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl VaultStore for FileVaultStore {
    async fn has_vault(&self) -> Result<bool> {
        Ok(self.load_fields().await?.is_complete())
    }

    async fn write(&self, record: &VaultRecord) -> Result<()> {
        self.store_fields(&StoredFields::from(record)).await
    }

    async fn update(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<()> {
        // Re-read so the salt written at creation is carried over as-is.
        let mut fields = self.load_fields().await?;
        if !fields.is_complete() {
            return Err(FormVaultError::NoVault);
        }

        fields.vault_iv = Some(iv.to_vec());
        fields.vault_data = Some(ciphertext.to_vec());
        self.store_fields(&fields).await
    }

    async fn read(&self) -> Result<VaultRecord> {
        self.load_fields().await?.into_record()
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "vault file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryVaultStore
// ---------------------------------------------------------------------------

/// A vault held in process memory.
#[derive(Debug, Default)]
pub struct MemoryVaultStore {
    fields: Mutex<StoredFields>,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the raw fields directly.  Lets tests simulate damaged or
    /// partially written storage.
    pub fn set_fields(&self, fields: StoredFields) {
        *self.lock() = fields;
    }

    /// A copy of the raw fields.
    pub fn fields(&self) -> StoredFields {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoredFields> {
        // A poisoned lock still holds a consistent value: every write
        // below is a single assignment.
        self.fields.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VaultStore for MemoryVaultStore {
    async fn has_vault(&self) -> Result<bool> {
        Ok(self.lock().is_complete())
    }

    async fn write(&self, record: &VaultRecord) -> Result<()> {
        *self.lock() = StoredFields::from(record);
        Ok(())
    }

    async fn update(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<()> {
        let mut fields = self.lock();
        if !fields.is_complete() {
            return Err(FormVaultError::NoVault);
        }
        let mut next = fields.clone();
        next.vault_iv = Some(iv.to_vec());
        next.vault_data = Some(ciphertext.to_vec());
        *fields = next;
        Ok(())
    }

    async fn read(&self) -> Result<VaultRecord> {
        self.lock().clone().into_record()
    }

    async fn clear(&self) -> Result<()> {
        *self.lock() = StoredFields::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SALT_LEN;
    use tempfile::TempDir;

    fn record(iv_byte: u8) -> VaultRecord {
        VaultRecord {
            salt: [9u8; SALT_LEN],
            iv: [iv_byte; IV_LEN],
            ciphertext: vec![iv_byte; 40],
        }
    }

    #[tokio::test]
    async fn file_store_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileVaultStore::new(dir.path().join("vault.json"));
        assert!(!store.has_vault().await.unwrap());
        assert!(matches!(store.read().await, Err(FormVaultError::NoVault)));
    }

    #[tokio::test]
    async fn file_store_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = FileVaultStore::new(dir.path().join("vault.json"));
        store.write(&record(1)).await.unwrap();

        assert!(store.has_vault().await.unwrap());
        assert_eq!(store.read().await.unwrap(), record(1));
    }

    #[tokio::test]
    async fn file_store_update_keeps_salt() {
        let dir = TempDir::new().unwrap();
        let store = FileVaultStore::new(dir.path().join("vault.json"));
        store.write(&record(1)).await.unwrap();

        store.update(&[7u8; IV_LEN], b"new-ciphertext").await.unwrap();

        let read = store.read().await.unwrap();
        assert_eq!(read.salt, [9u8; SALT_LEN]);
        assert_eq!(read.iv, [7u8; IV_LEN]);
        assert_eq!(read.ciphertext, b"new-ciphertext");
    }

    #[tokio::test]
    async fn file_store_update_without_vault_fails() {
        let dir = TempDir::new().unwrap();
        let store = FileVaultStore::new(dir.path().join("vault.json"));
        let result = store.update(&[0u8; IV_LEN], b"x").await;
        assert!(matches!(result, Err(FormVaultError::NoVault)));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn file_store_clear_removes_file_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileVaultStore::new(dir.path().join("vault.json"));
        store.write(&record(1)).await.unwrap();

        store.clear().await.unwrap();
        assert!(!store.path().exists());
        store.clear().await.unwrap();
        assert!(!store.has_vault().await.unwrap());
    }

    #[tokio::test]
    async fn file_store_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FileVaultStore::new(dir.path().join("vault.json"));
        store.write(&record(1)).await.unwrap();
        store.update(&[3u8; IV_LEN], b"abc").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["vault.json".to_string()]);
    }

    #[tokio::test]
    async fn file_store_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileVaultStore::new(&path);
        assert!(matches!(
            store.read().await,
            Err(FormVaultError::InvalidVaultFormat(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileVaultStore::new(dir.path().join("vault.json"));
        store.write(&record(1)).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_rewrite_tightens_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileVaultStore::new(&path);
        store.write(&record(1)).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_file_writes_all_land() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");

        let mut tasks = Vec::new();
        for i in 0..16u8 {
            let store = FileVaultStore::new(&path);
            tasks.push(tokio::spawn(async move { store.write(&record(i)).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Whichever rename came last wins, whole.
        let read = FileVaultStore::new(&path).read().await.unwrap();
        assert!((0..16u8).any(|i| read == record(i)));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["vault.json".to_string()]);
    }

    #[tokio::test]
    async fn memory_store_partial_fields_are_no_vault() {
        let store = MemoryVaultStore::new();
        store.set_fields(StoredFields {
            vault_salt: Some(vec![0u8; SALT_LEN]),
            ..StoredFields::default()
        });
        assert!(!store.has_vault().await.unwrap());
        assert!(matches!(
            store.update(&[0u8; IV_LEN], b"x").await,
            Err(FormVaultError::NoVault)
        ));
    }

    #[tokio::test]
    async fn memory_store_update_and_clear() {
        let store = MemoryVaultStore::new();
        store.write(&record(1)).await.unwrap();
        store.update(&[5u8; IV_LEN], b"fresh").await.unwrap();

        let read = store.read().await.unwrap();
        assert_eq!(read.salt, [9u8; SALT_LEN]);
        assert_eq!(read.ciphertext, b"fresh");

        store.clear().await.unwrap();
        assert!(!store.has_vault().await.unwrap());
    }
}
