#![forbid(unsafe_code)]

//! Encrypted, page-addressed virtual file system layered on a flat
//! key/value store.
//!
//! A single logical volume holds a hierarchical tree of files and
//! directories, transparently encrypted with a user password. File content
//! never lives in the tree itself: it is split into fixed-size pages, each
//! encrypted and stored under a generated identifier.
//!
//! # Concurrency
//!
//! The volume assumes a single logical owner mutating it at a time. The
//! internal mutex only keeps the shared views ([`Wrapper`], [`KeyChain`],
//! open [`File`] handles) memory safe; it is not a transactional isolation
//! layer. The per-node busy flag is the only file-level exclusivity guard.

pub mod crypto;
pub mod error;
pub mod fs;
pub mod storage;
pub mod volume;

pub use error::VfsError;
pub use fs::file::{File, OpenFlags};
pub use fs::tree::{FileInfo, SortOrder};
pub use storage::{MemoryStorage, Storage, StorageError};
pub use volume::{FileSystem, KeyChain, SecretRecord, Wrapper};
