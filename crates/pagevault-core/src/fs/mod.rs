//! The in-memory file tree and the paged file handle built on top of it.

pub mod file;
pub mod path;
pub mod tree;

pub use file::{File, OpenFlags};
pub use tree::{FileInfo, FileTree, NodeId, SortOrder};
