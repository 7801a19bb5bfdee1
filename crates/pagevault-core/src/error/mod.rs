//! Error taxonomy for the volume layer.
//!
//! Local validation errors are returned before any state is mutated.
//! Multi-item operations (recursive page deletion) collect sub-errors and
//! report them together instead of aborting on the first failure.

use thiserror::Error;

pub use crate::crypto::CryptoError;
pub use crate::storage::StorageError;

/// All errors the virtual file system surfaces to callers.
#[derive(Error, Debug)]
pub enum VfsError {
    /// Operation attempted before authentication, or a protected action
    /// without correct credentials.
    #[error("operation '{op}' requires authentication")]
    Permission { op: &'static str },

    /// A path or id resolved to nothing.
    #[error("no such file or directory: {what}")]
    NotExist { what: String },

    /// Structurally malformed request: empty name, name containing a
    /// separator, wrong node kind, format on a non-empty volume, page size
    /// below the minimum.
    #[error("invalid request: {reason}")]
    Invalid { reason: String },

    /// The node is already open.
    #[error("'{name}' is busy: already open")]
    Busy { name: String },

    /// Duplicate name, or directory-not-empty on removal.
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// A read handle was positioned at or past the end of its content.
    /// Carries the offset the handle now reports.
    #[error("end of content reached at offset {offset}")]
    EndOfContent { offset: u64 },

    /// Propagated verbatim from the storage capability.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Key derivation or codec failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A persisted blob failed to serialize or parse.
    #[error("blob format error: {0}")]
    Format(#[from] serde_json::Error),

    /// Local filesystem failure while importing external files.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A recursive removal deleted the tree node but some page deletions
    /// failed. `removed` counts the pages that were deleted successfully.
    #[error("removed {removed} pages but {} deletions failed (first: {})", errors.len(), errors[0])]
    PartialRemoval {
        removed: usize,
        errors: Vec<StorageError>,
    },
}

impl VfsError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        VfsError::Invalid {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_exist(what: impl Into<String>) -> Self {
        VfsError::NotExist { what: what.into() }
    }

    pub(crate) fn conflict(reason: impl Into<String>) -> Self {
        VfsError::Conflict {
            reason: reason.into(),
        }
    }

    pub(crate) fn busy(name: impl Into<String>) -> Self {
        VfsError::Busy { name: name.into() }
    }
}
