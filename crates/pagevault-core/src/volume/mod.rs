//! The volume layer: the orchestrator and its views.
//!
//! [`FileSystem`] (path-addressed), [`Wrapper`] (id-addressed), and
//! [`KeyChain`] (secret records) are all views over one shared
//! [`Volume`]. Handles returned by either file API share it too, which is
//! what lets a handle flush pages and persist the tree after the view that
//! produced it has gone away.

mod credential;
mod filesystem;
mod keychain;
mod wrapper;

pub use filesystem::{FileSystem, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};
pub use keychain::{KeyChain, SecretRecord};
pub use wrapper::Wrapper;

pub(crate) use filesystem::{lock_volume, Volume};
