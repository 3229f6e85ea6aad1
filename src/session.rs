//! Ephemeral holder of the unlocked session key.
//!
//! The cache is a single named slot holding the key's exported base64
//! form.  It lives as long as the host process and is shared by every
//! request handler through an `Arc`, never through a global.
//!
//! `clear` is synchronous: once it returns, every `get` from any thread
//! sees an empty slot.
//!
//! The cache also carries the vault's operation lock.  Every manager
//! built over the same cache takes it, so handlers that each build their
//! own manager still serialize against one another.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::SessionKey;
use crate::errors::Result;

/// Name of the slot holding the exported session key.
pub const SESSION_KEY_NAME: &str = "masterKey";

/// Process-lifetime cache for the unlocked key.
#[derive(Default)]
pub struct SessionKeyCache {
    slots: RwLock<HashMap<&'static str, Zeroizing<String>>>,
    /// One logical lock per vault, held for a whole manager operation.
    op_lock: Mutex<()>,
}

impl SessionKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached key, or `None` while locked.
    pub fn get(&self) -> Result<Option<SessionKey>> {
        self.read()
            .get(SESSION_KEY_NAME)
            .map(|exported| SessionKey::import(exported))
            .transpose()
    }

    /// `true` if a key is cached.  Does not decode it.
    pub fn is_populated(&self) -> bool {
        self.read().contains_key(SESSION_KEY_NAME)
    }

    /// Cache `key`, replacing any previous one.
    pub fn set(&self, key: &SessionKey) {
        self.write().insert(SESSION_KEY_NAME, key.export());
        debug!("session key cached");
    }

    /// Drop the cached key.  The exported string is zeroized on removal.
    pub fn clear(&self) {
        if self.write().remove(SESSION_KEY_NAME).is_some() {
            debug!("session key cleared");
        }
    }

    /// Wait for exclusive use of the vault.  Held across the awaits of a
    /// single manager operation.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<&'static str, Zeroizing<String>>> {
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<&'static str, Zeroizing<String>>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for SessionKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyCache")
            .field("populated", &self.is_populated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_cache_returns_none() {
        let cache = SessionKeyCache::new();
        assert!(cache.get().unwrap().is_none());
        assert!(!cache.is_populated());
    }

    #[test]
    fn set_then_get_returns_same_key() {
        let cache = SessionKeyCache::new();
        let key = SessionKey::from_bytes([4u8; 32]);
        cache.set(&key);
        assert_eq!(cache.get().unwrap(), Some(key));
    }

    #[test]
    fn clear_is_visible_to_other_threads_immediately() {
        let cache = Arc::new(SessionKeyCache::new());
        cache.set(&SessionKey::from_bytes([8u8; 32]));
        cache.clear();

        let shared = Arc::clone(&cache);
        let seen = std::thread::spawn(move || shared.get().unwrap().is_none())
            .join()
            .unwrap();
        assert!(seen);
    }

    #[tokio::test]
    async fn exclusive_access_is_shared_through_the_arc() {
        let cache = Arc::new(SessionKeyCache::new());
        let other = Arc::clone(&cache);

        let guard = cache.exclusive().await;
        assert!(other.op_lock.try_lock().is_err());
        drop(guard);
        assert!(other.op_lock.try_lock().is_ok());
    }

    #[test]
    fn debug_shows_only_population() {
        let cache = SessionKeyCache::new();
        cache.set(&SessionKey::from_bytes([1u8; 32]));
        assert_eq!(
            format!("{cache:?}"),
            "SessionKeyCache { populated: true }"
        );
    }
}
