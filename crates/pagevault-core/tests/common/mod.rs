//! Shared helpers for the integration tests.

#![allow(dead_code)]

use pagevault_core::crypto::KdfParams;
use pagevault_core::{FileSystem, MemoryStorage};

/// Small page size so multi-page content stays cheap to generate.
pub const PAGE: u64 = 4096;

/// Open a volume over an existing storage handle.
pub fn open_fs(storage: MemoryStorage) -> FileSystem {
    FileSystem::new(Box::new(storage)).expect("open volume")
}

/// A fresh unencrypted volume formatted with the test page size. The
/// returned storage handle shares the map, so the volume can be "reopened"
/// later.
pub fn plain_fs() -> (FileSystem, MemoryStorage) {
    let storage = MemoryStorage::new();
    let fs = open_fs(storage.clone());
    fs.format(PAGE).expect("format");
    (fs, storage)
}

/// A fresh volume protected with `password`, using weak KDF parameters so
/// tests do not pay interactive-strength derivation cost.
pub fn encrypted_fs(password: &str) -> (FileSystem, MemoryStorage) {
    let (fs, storage) = plain_fs();
    fs.set_password_with_kdf(password, KdfParams::fast_insecure())
        .expect("set password");
    (fs, storage)
}

/// Deterministic patterned bytes, so misplaced page boundaries show up as
/// content mismatches.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
