//! In-memory reference implementation of [`Storage`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::{Storage, StorageError};

/// A [`Storage`] backed by a shared in-memory map.
///
/// Cloning yields a second handle onto the same map, so a test (or an
/// embedding application) can drop a volume and reopen it over the same
/// bytes, the way a disk-backed store would survive a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    map: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key currently exists. Useful for asserting page cleanup.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of all keys, unordered.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_is_not_found() {
        let store = MemoryStorage::new();
        let err = store.get("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn put_get_delete_round_trip() {
        let mut store = MemoryStorage::new();
        store.put("a", b"hello").unwrap();
        assert_eq!(store.get("a").unwrap(), b"hello");
        store.put("a", b"replaced").unwrap();
        assert_eq!(store.get("a").unwrap(), b"replaced");
        store.delete("a").unwrap();
        assert!(store.get("a").unwrap_err().is_not_found());
    }

    #[test]
    fn delete_missing_is_ok() {
        let mut store = MemoryStorage::new();
        store.delete("never-existed").unwrap();
    }

    #[test]
    fn clones_share_the_map() {
        let mut store = MemoryStorage::new();
        let view = store.clone();
        store.put("k", b"v").unwrap();
        assert_eq!(view.get("k").unwrap(), b"v");
    }
}
