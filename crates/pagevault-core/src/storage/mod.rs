//! The flat key/value storage capability the volume layer consumes.
//!
//! The core makes no assumptions about the backend beyond per-key atomicity:
//! an in-memory map, an embedded SQL table, or an object store all qualify.
//! Five reserved keys hold volume metadata; every other key is a generated
//! page identifier.

pub mod memory;

pub use memory::MemoryStorage;

use thiserror::Error;

/// Reserved key for the encrypted credential blob.
pub const KEY_CREDENTIAL: &str = "credential";
/// Reserved key for the serialized directory tree.
pub const KEY_TREE: &str = "fs-root";
/// Reserved key for the configuration blob.
pub const KEY_CONFIG: &str = "fs-config";
/// Reserved key for the page size integer.
pub const KEY_PAGE_SIZE: &str = "fs-page-size";
/// Reserved key for the keychain blob.
pub const KEY_KEYCHAIN: &str = "fs-keychain";

/// Errors surfaced by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The key does not exist. Callers rely on this being distinguishable
    /// from backend failures (a missing tree blob means a fresh volume,
    /// not a broken one).
    #[error("key not found: {0}")]
    NotFound(String),

    /// Any other backend failure, wrapped with the operation context.
    #[error("storage {op} failed for key '{key}': {message}")]
    Backend {
        op: &'static str,
        key: String,
        message: String,
    },
}

impl StorageError {
    /// True if this is the distinguished "not found" condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// A flat key→bytes store.
///
/// No ordering or transactional guarantees are assumed beyond per-key
/// atomicity. Implementations may be slow; the volume layer performs all
/// its work synchronously from the caller's perspective.
pub trait Storage: Send {
    /// Fetch the value stored under `key`.
    ///
    /// Returns [`StorageError::NotFound`] if the key is absent.
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete `key`. Deleting an absent key is not an error.
    fn delete(&mut self, key: &str) -> Result<(), StorageError>;

    /// Release backend resources. The default implementation is a no-op.
    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}
