//! The identity-addressed view: the same tree, addressed by stable node id
//! instead of path.
//!
//! Integrations that keep long-lived references to nodes use this surface,
//! so name collisions are resolved by disambiguation instead of conflict
//! errors: a second `create("report.txt")` in the same directory yields
//! `report-1.txt`.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::error::VfsError;
use crate::fs::file::{File, OpenFlags};
use crate::fs::path;
use crate::fs::tree::{FileInfo, NodeId};
use crate::volume::{lock_volume, Volume};

/// UUID-addressed API over a shared volume.
///
/// An empty id conventionally means the root.
pub struct Wrapper {
    inner: Arc<Mutex<Volume>>,
}

impl Wrapper {
    pub(crate) fn new(inner: Arc<Mutex<Volume>>) -> Self {
        Self { inner }
    }

    fn resolve(vol: &Volume, id: &str) -> Result<NodeId, VfsError> {
        if id.is_empty() {
            return Ok(vol.tree.root());
        }
        vol.tree
            .find_uuid(id)
            .ok_or_else(|| VfsError::not_exist(format!("id {id}")))
    }

    /// Create a directory under `parent_id`, disambiguating the name.
    pub fn mkdir(&self, parent_id: &str, name: &str) -> Result<FileInfo, VfsError> {
        self.insert(parent_id, name, true)
    }

    /// Create an empty file under `dir_id`, disambiguating the name. The
    /// content type is detected from the final name's extension.
    pub fn create(&self, dir_id: &str, name: &str) -> Result<FileInfo, VfsError> {
        self.insert(dir_id, name, false)
    }

    fn insert(&self, parent_id: &str, name: &str, directory: bool) -> Result<FileInfo, VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("create")?;
        path::validate_name(name)?;
        let parent = Self::resolve(&vol, parent_id)?;
        let unique = vol.tree.distinct_name(parent, name);
        let info = if directory {
            FileInfo::new_directory(unique)
        } else {
            FileInfo::new_file(unique)
        };
        let node = vol.tree.insert(parent, info)?;
        vol.persist_tree()?;
        Ok(vol.tree.info(node).clone())
    }

    /// Open an existing node by id. `CREATE` has no meaning here; the node
    /// must already exist.
    pub fn open(&self, id: &str, flags: OpenFlags) -> Result<File, VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("open")?;
        let node = Self::resolve(&vol, id)?;
        let mode = vol.begin_open(node, flags)?;
        Ok(File::open(Arc::clone(&self.inner), node, mode))
    }

    /// Remove a node by id, recursively, deleting its pages from storage.
    pub fn remove(&self, id: &str) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("remove")?;
        let node = Self::resolve(&vol, id)?;
        vol.remove_node(node, false)
    }

    /// Reparent a node under `new_parent_id`. Idempotent when the node is
    /// already there.
    pub fn mv(&self, id: &str, new_parent_id: &str) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("move")?;
        let node = Self::resolve(&vol, id)?;
        let parent = Self::resolve(&vol, new_parent_id)?;
        vol.tree.attach(node, parent)?;
        vol.persist_tree()
    }

    /// Metadata snapshot by id. Directory sizes are refreshed first.
    pub fn stat(&self, id: &str) -> Result<FileInfo, VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("stat")?;
        let node = Self::resolve(&vol, id)?;
        if vol.tree.info(node).is_directory {
            vol.tree.listing(node)?;
        }
        Ok(vol.tree.info(node).clone())
    }

    /// One level of child metadata by id.
    pub fn list(&self, id: &str) -> Result<Vec<FileInfo>, VfsError> {
        let vol = lock_volume(&self.inner);
        vol.require_auth("list")?;
        let node = Self::resolve(&vol, id)?;
        if !vol.tree.info(node).is_directory {
            return Err(VfsError::invalid(format!("id {id} is not a directory")));
        }
        Ok(vol
            .tree
            .children(node)
            .iter()
            .map(|&c| vol.tree.info(c).clone())
            .collect())
    }

    /// Read a whole file by id.
    pub fn read(&self, id: &str) -> Result<Vec<u8>, VfsError> {
        let mut file = self.open(id, OpenFlags::READ)?;
        let data = file.read_to_end()?;
        file.close()?;
        Ok(data)
    }

    /// Replace a file's content by id.
    pub fn write(&self, id: &str, data: &[u8]) -> Result<(), VfsError> {
        let mut file = self.open(id, OpenFlags::WRITE)?;
        file.write(data)?;
        file.close()
    }

    /// Mirror an external file or directory tree into the volume under
    /// `dir_id`, node by node.
    ///
    /// Directory structure is recreated with disambiguated names; each
    /// regular file's content is copied through a write session and its
    /// content type detected from the extension. Symlinks and other special
    /// entries are skipped. Returns the metadata of the imported root.
    #[instrument(skip(self), fields(source = %source.display()))]
    pub fn import(&self, dir_id: &str, source: &Path) -> Result<FileInfo, VfsError> {
        let meta = std::fs::metadata(source)?;
        let name = source
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| VfsError::invalid("source path has no usable name"))?;

        if !meta.is_dir() {
            let info = self.create(dir_id, name)?;
            self.write(&info.id, &std::fs::read(source)?)?;
            return self.stat(&info.id);
        }

        let root = self.mkdir(dir_id, name)?;
        let mut dirs: HashMap<PathBuf, String> =
            HashMap::from([(source.to_path_buf(), root.id.clone())]);
        for entry in WalkDir::new(source).min_depth(1) {
            let entry = entry.map_err(|e| {
                let msg = e.to_string();
                VfsError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
            })?;
            let parent = entry
                .path()
                .parent()
                .and_then(|p| dirs.get(p))
                .ok_or_else(|| {
                    VfsError::invalid(format!(
                        "walk yielded '{}' before its parent",
                        entry.path().display()
                    ))
                })?
                .clone();
            let name = entry
                .file_name()
                .to_str()
                .ok_or_else(|| {
                    VfsError::invalid(format!(
                        "non-UTF-8 name in '{}'",
                        entry.path().display()
                    ))
                })?;
            if entry.file_type().is_dir() {
                let info = self.mkdir(&parent, name)?;
                dirs.insert(entry.path().to_path_buf(), info.id);
            } else if entry.file_type().is_file() {
                let info = self.create(&parent, name)?;
                self.write(&info.id, &std::fs::read(entry.path())?)?;
            } else {
                debug!(path = %entry.path().display(), "skipping special entry");
            }
        }
        self.stat(&root.id)
    }
}
