//! The volume orchestrator: credential lifecycle, blob persistence, and the
//! path-addressed file system API.
//!
//! A [`Volume`] owns the storage capability, the metadata tree, the page
//! size, and (once unlocked) the content-key codec. [`FileSystem`] is the
//! public path-addressed view; [`crate::Wrapper`] and [`crate::KeyChain`]
//! are sibling views over the same volume.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::crypto::{KdfParams, PageCodec};
use crate::error::VfsError;
use crate::fs::file::{File, Mode, OpenFlags};
use crate::fs::path;
use crate::fs::tree::{FileInfo, FileTree, NodeId, SortOrder, TreeBlob};
use crate::storage::{Storage, KEY_CONFIG, KEY_CREDENTIAL, KEY_KEYCHAIN, KEY_PAGE_SIZE, KEY_TREE};
use crate::volume::{credential, KeyChain, Wrapper};

/// Smallest page size `format` accepts.
pub const MIN_PAGE_SIZE: u64 = 4 * 1024;
/// Page size used when storage carries none.
pub const DEFAULT_PAGE_SIZE: u64 = 1024 * 1024;

/// Shared volume state behind the public views.
///
/// Not internally synchronized beyond the mutex that makes sharing across
/// views memory safe: the design assumes a single logical owner mutates the
/// volume at a time, and the busy flag only guards double-opens of one node.
pub(crate) struct Volume {
    storage: Box<dyn Storage>,
    pub(crate) tree: FileTree,
    pub(crate) page_size: u64,
    /// Raw credential blob, empty when the volume is unencrypted.
    credential: Vec<u8>,
    /// Present once authentication has succeeded.
    codec: Option<PageCodec>,
    config: Map<String, Value>,
}

/// Lock the shared volume. A poisoned mutex is recovered rather than
/// propagated: volume state stays consistent across an unwinding caller
/// because every mutation either completes under the lock or returns early
/// before mutating.
pub(crate) fn lock_volume(inner: &Arc<Mutex<Volume>>) -> MutexGuard<'_, Volume> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Volume {
    fn open(storage: Box<dyn Storage>) -> Result<Self, VfsError> {
        let page_size = match storage.get(KEY_PAGE_SIZE) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.is_not_found() => DEFAULT_PAGE_SIZE,
            Err(e) => return Err(e.into()),
        };
        let credential = match storage.get(KEY_CREDENTIAL) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let mut volume = Self {
            storage,
            tree: FileTree::new(),
            page_size,
            credential,
            codec: None,
            config: Map::new(),
        };
        if volume.credential.is_empty() {
            volume.load_state()?;
            debug!(page_size, "opened unencrypted volume");
        } else {
            debug!(page_size, "opened encrypted volume; locked until auth");
        }
        Ok(volume)
    }

    pub(crate) fn authed(&self) -> bool {
        self.credential.is_empty() || self.codec.is_some()
    }

    pub(crate) fn require_auth(&self, op: &'static str) -> Result<(), VfsError> {
        if self.authed() {
            Ok(())
        } else {
            Err(VfsError::Permission { op })
        }
    }

    /// Apply the content-key transform, or pass bytes through on an
    /// unencrypted volume.
    fn transform(&self, seed: &str, data: &[u8]) -> Vec<u8> {
        match &self.codec {
            Some(codec) => codec.transform(seed, data),
            None => data.to_vec(),
        }
    }

    pub(crate) fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, VfsError> {
        match self.storage.get(key) {
            Ok(bytes) => Ok(Some(self.transform(key, &bytes))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn put_blob(&mut self, key: &str, plain: &[u8]) -> Result<(), VfsError> {
        let sealed = self.transform(key, plain);
        self.storage.put(key, &sealed)?;
        Ok(())
    }

    fn load_state(&mut self) -> Result<(), VfsError> {
        self.tree = match self.get_blob(KEY_TREE)? {
            Some(bytes) => {
                let blob: TreeBlob = serde_json::from_slice(&bytes)?;
                FileTree::from_blob(blob)
            }
            None => FileTree::new(),
        };
        self.config = match self.get_blob(KEY_CONFIG)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Map::new(),
        };
        Ok(())
    }

    pub(crate) fn persist_tree(&mut self) -> Result<(), VfsError> {
        let blob = serde_json::to_vec(&self.tree.to_blob(self.tree.root()))?;
        self.put_blob(KEY_TREE, &blob)
    }

    fn persist_config(&mut self) -> Result<(), VfsError> {
        let blob = serde_json::to_vec(&self.config)?;
        self.put_blob(KEY_CONFIG, &blob)
    }

    /// The page size is needed before authentication, so it is stored as
    /// plain JSON, never through the codec.
    fn persist_page_size(&mut self) -> Result<(), VfsError> {
        let bytes = serde_json::to_vec(&self.page_size)?;
        self.storage.put(KEY_PAGE_SIZE, &bytes)?;
        Ok(())
    }

    pub(crate) fn read_page(&self, id: &str) -> Result<Vec<u8>, VfsError> {
        let bytes = self.storage.get(id)?;
        Ok(self.transform(id, &bytes))
    }

    /// Store one content page under a fresh generated id.
    pub(crate) fn write_page(&mut self, data: &[u8]) -> Result<String, VfsError> {
        let id = Uuid::new_v4().to_string();
        let sealed = self.transform(&id, data);
        self.storage.put(&id, &sealed)?;
        Ok(id)
    }

    /// Delete a page that is no longer referenced. Failure only costs
    /// storage space, never correctness, so it is logged and swallowed.
    pub(crate) fn delete_page_best_effort(&mut self, id: &str) {
        if let Err(e) = self.storage.delete(id) {
            warn!(page = id, error = %e, "failed to delete orphaned page");
        }
    }

    /// Walk `segments` from the root, creating missing directories.
    pub(crate) fn mkdir_all_segments(&mut self, segments: &[&str]) -> Result<NodeId, VfsError> {
        let mut cur = self.tree.root();
        for seg in segments {
            cur = match self.tree.find_child(cur, seg) {
                Some(n) if self.tree.info(n).is_directory => n,
                Some(n) => {
                    return Err(VfsError::conflict(format!(
                        "'{}' exists and is not a directory",
                        self.tree.path_of(n)
                    )))
                }
                None => self.tree.insert(cur, FileInfo::new_directory(*seg))?,
            };
        }
        Ok(cur)
    }

    pub(crate) fn resolve_path(&self, p: &str) -> Result<NodeId, VfsError> {
        self.tree.find_path(p).ok_or_else(|| VfsError::not_exist(p))
    }

    /// Validate flags against the node and take its busy slot.
    pub(crate) fn begin_open(&mut self, node: NodeId, flags: OpenFlags) -> Result<Mode, VfsError> {
        let read = flags.contains(OpenFlags::READ);
        let write = flags.contains(OpenFlags::WRITE);
        if read == write {
            return Err(VfsError::invalid(
                "open requires exactly one of READ and WRITE",
            ));
        }
        if write && self.tree.info(node).is_directory {
            return Err(VfsError::invalid(format!(
                "cannot open directory '{}' for writing",
                self.tree.path_of(node)
            )));
        }
        if self.tree.is_busy(node) {
            return Err(VfsError::busy(self.tree.info(node).name.clone()));
        }
        self.tree.set_busy(node, true);
        Ok(if write { Mode::Write } else { Mode::Read })
    }

    /// Remove a subtree and delete its pages from storage.
    ///
    /// Page deletion failures are collected and reported together once the
    /// whole subtree has been walked; the tree mutation itself is already
    /// persisted by then.
    pub(crate) fn remove_node(&mut self, node: NodeId, must_be_empty: bool) -> Result<(), VfsError> {
        if node == self.tree.root() {
            return Err(VfsError::invalid("cannot remove the root"));
        }
        if let Some(name) = self.tree.busy_in_subtree(node) {
            return Err(VfsError::busy(name));
        }
        if must_be_empty
            && self.tree.info(node).is_directory
            && !self.tree.children(node).is_empty()
        {
            return Err(VfsError::conflict(format!(
                "directory '{}' is not empty",
                self.tree.path_of(node)
            )));
        }
        let pages = self.tree.remove(node)?;
        self.persist_tree()?;
        let mut removed = 0usize;
        let mut errors = Vec::new();
        for id in &pages {
            match self.storage.delete(id) {
                Ok(()) => removed += 1,
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(VfsError::PartialRemoval { removed, errors })
        }
    }
}

/// The path-addressed volume API.
///
/// Construction only reads the page size and credential; on an encrypted
/// volume the tree and configuration stay unloaded until [`FileSystem::auth`]
/// succeeds, and every mutating operation fails with a permission error
/// until then.
pub struct FileSystem {
    inner: Arc<Mutex<Volume>>,
}

impl FileSystem {
    /// Open a volume over the given storage.
    pub fn new(storage: Box<dyn Storage>) -> Result<Self, VfsError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(Volume::open(storage)?)),
        })
    }

    /// The identity-addressed view over the same volume.
    #[must_use]
    pub fn wrapper(&self) -> Wrapper {
        Wrapper::new(Arc::clone(&self.inner))
    }

    /// The secret-record store persisted alongside the volume.
    #[must_use]
    pub fn keychain(&self) -> KeyChain {
        KeyChain::new(Arc::clone(&self.inner))
    }

    /// Current page size in bytes.
    #[must_use]
    pub fn page_size(&self) -> u64 {
        lock_volume(&self.inner).page_size
    }

    /// Set the page size on a fresh volume.
    ///
    /// Only legal while the tree is empty; existing page lists would not
    /// survive a different page geometry.
    pub fn format(&self, page_size: u64) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("format")?;
        if page_size < MIN_PAGE_SIZE {
            return Err(VfsError::invalid(format!(
                "page size {page_size} is below the minimum {MIN_PAGE_SIZE}"
            )));
        }
        if !vol.tree.children(vol.tree.root()).is_empty() {
            return Err(VfsError::invalid("cannot format a non-empty volume"));
        }
        vol.page_size = page_size;
        vol.persist_page_size()
    }

    /// Protect an unencrypted volume with a password.
    pub fn set_password(&self, password: &str) -> Result<(), VfsError> {
        self.set_password_with_kdf(password, KdfParams::default())
    }

    /// [`FileSystem::set_password`] with explicit KDF cost parameters.
    #[instrument(skip_all)]
    pub fn set_password_with_kdf(&self, password: &str, params: KdfParams) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        if !vol.credential.is_empty() {
            return Err(VfsError::invalid("volume is already password protected"));
        }
        if password.is_empty() {
            return Err(VfsError::invalid("password must not be empty"));
        }
        let (blob, content_key) = credential::create(password, params)?;
        // Everything persisted while unencrypted must be re-sealed under the
        // new key: tree, configuration, keychain, and every content page.
        // The keychain blob is read before the codec is installed.
        let keychain = vol.get_blob(KEY_KEYCHAIN)?;
        let pages = vol.tree.all_page_ids();
        vol.storage.put(KEY_CREDENTIAL, &blob)?;
        vol.credential = blob;
        vol.codec = Some(PageCodec::new(*content_key));
        vol.persist_tree()?;
        vol.persist_config()?;
        if let Some(bytes) = keychain {
            vol.put_blob(KEY_KEYCHAIN, &bytes)?;
        }
        for id in &pages {
            let raw = vol.storage.get(id)?;
            let sealed = vol.transform(id, &raw);
            vol.storage.put(id, &sealed)?;
        }
        info!(resealed_pages = pages.len(), "volume password set");
        Ok(())
    }

    /// Replace the volume password, keeping the content key.
    ///
    /// Requires the old password to authenticate first. Stored pages stay
    /// valid: only the credential blob is rewritten.
    pub fn change_password(&self, old: &str, new: &str) -> Result<(), VfsError> {
        self.change_password_with_kdf(old, new, KdfParams::default())
    }

    /// [`FileSystem::change_password`] with explicit KDF cost parameters.
    #[instrument(skip_all)]
    pub fn change_password_with_kdf(
        &self,
        old: &str,
        new: &str,
        params: KdfParams,
    ) -> Result<(), VfsError> {
        if !self.auth(old)? {
            return Err(VfsError::Permission {
                op: "change_password",
            });
        }
        if new.is_empty() {
            return Err(VfsError::invalid("password must not be empty"));
        }
        let mut vol = lock_volume(&self.inner);
        let content_key = match credential::unlock(&vol.credential, old)? {
            Some(key) => key,
            // auth above just verified this password.
            None => return Err(VfsError::Permission {
                op: "change_password",
            }),
        };
        let blob = credential::seal(new, params, &content_key)?;
        vol.storage.put(KEY_CREDENTIAL, &blob)?;
        vol.credential = blob;
        info!("volume password changed");
        Ok(())
    }

    /// Attempt to unlock the volume.
    ///
    /// Returns `Ok(false)` without mutating state on an empty credential,
    /// an empty password, or a mismatch. On a match the content key is
    /// adopted and the tree and configuration are loaded.
    #[instrument(skip_all)]
    pub fn auth(&self, password: &str) -> Result<bool, VfsError> {
        let mut vol = lock_volume(&self.inner);
        if vol.credential.is_empty() || password.is_empty() {
            return Ok(false);
        }
        if vol.codec.is_some() {
            // Already unlocked; still verify the candidate password.
            return Ok(credential::unlock(&vol.credential, password)?.is_some());
        }
        match credential::unlock(&vol.credential, password)? {
            Some(content_key) => {
                vol.codec = Some(PageCodec::new(*content_key));
                vol.load_state()?;
                info!("volume unlocked");
                Ok(true)
            }
            None => {
                debug!("authentication rejected");
                Ok(false)
            }
        }
    }

    /// True if the volume has no credential or authentication has already
    /// succeeded in this session.
    #[must_use]
    pub fn auth_passed(&self) -> bool {
        lock_volume(&self.inner).authed()
    }

    /// Create one directory.
    ///
    /// Idempotent when the full path already names a directory; a file of
    /// the same name is a conflict. Intermediate segments must already
    /// exist (see [`FileSystem::mkdir_all`]).
    pub fn mkdir(&self, p: &str) -> Result<FileInfo, VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("mkdir")?;
        if let Some(existing) = vol.tree.find_path(p) {
            let info = vol.tree.info(existing);
            if info.is_directory {
                return Ok(info.clone());
            }
            return Err(VfsError::conflict(format!(
                "'{p}' exists and is not a directory"
            )));
        }
        let (parents, leaf) = path::parent_and_leaf(p)
            .unwrap_or_else(|| unreachable!("root always resolves"));
        let mut dir = vol.tree.root();
        for seg in &parents {
            dir = vol
                .tree
                .find_child(dir, seg)
                .ok_or_else(|| VfsError::not_exist(*seg))?;
            if !vol.tree.info(dir).is_directory {
                return Err(VfsError::invalid(format!("'{seg}' is not a directory")));
            }
        }
        let node = vol.tree.insert(dir, FileInfo::new_directory(leaf))?;
        vol.persist_tree()?;
        Ok(vol.tree.info(node).clone())
    }

    /// Create a directory chain, making intermediate segments as needed.
    pub fn mkdir_all(&self, p: &str) -> Result<FileInfo, VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("mkdir_all")?;
        let segments = path::segments(p);
        let node = vol.mkdir_all_segments(&segments)?;
        if !vol.tree.info(node).is_directory {
            return Err(VfsError::conflict(format!(
                "'{p}' exists and is not a directory"
            )));
        }
        vol.persist_tree()?;
        Ok(vol.tree.info(node).clone())
    }

    /// Open a node for reading or writing.
    ///
    /// Missing parent directories are created implicitly; the leaf is
    /// created when `CREATE` is set. The tree is persisted before the
    /// handle is returned, so the stored tree reflects newly created
    /// (even empty) nodes immediately.
    #[instrument(skip(self, flags), fields(path = p))]
    pub fn open_file(&self, p: &str, flags: OpenFlags) -> Result<File, VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("open_file")?;
        let node = match vol.tree.find_path(p) {
            Some(n) => n,
            None => {
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(VfsError::not_exist(p));
                }
                let (parents, leaf) = path::parent_and_leaf(p)
                    .unwrap_or_else(|| unreachable!("root always resolves"));
                let dir = vol.mkdir_all_segments(&parents)?;
                vol.tree.insert(dir, FileInfo::new_file(leaf))?
            }
        };
        let mode = vol.begin_open(node, flags)?;
        if let Err(e) = vol.persist_tree() {
            vol.tree.set_busy(node, false);
            return Err(e);
        }
        Ok(File::open(Arc::clone(&self.inner), node, mode))
    }

    /// Open a file for writing, creating it if missing.
    pub fn create(&self, p: &str) -> Result<File, VfsError> {
        self.open_file(p, OpenFlags::WRITE | OpenFlags::CREATE)
    }

    /// Metadata snapshot of a node. Directory sizes are refreshed from the
    /// serialized listing before the snapshot is taken.
    pub fn stat(&self, p: &str) -> Result<FileInfo, VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("stat")?;
        let node = vol.resolve_path(p)?;
        if vol.tree.info(node).is_directory {
            vol.tree.listing(node)?;
        }
        Ok(vol.tree.info(node).clone())
    }

    /// One level of child metadata under a directory.
    pub fn list(&self, p: &str) -> Result<Vec<FileInfo>, VfsError> {
        let vol = lock_volume(&self.inner);
        vol.require_auth("list")?;
        let node = vol.resolve_path(p)?;
        if !vol.tree.info(node).is_directory {
            return Err(VfsError::invalid(format!("'{p}' is not a directory")));
        }
        Ok(vol
            .tree
            .children(node)
            .iter()
            .map(|&c| vol.tree.info(c).clone())
            .collect())
    }

    /// Remove a file or an empty directory.
    pub fn remove(&self, p: &str) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("remove")?;
        let node = vol.resolve_path(p)?;
        vol.remove_node(node, true)
    }

    /// Remove a subtree recursively.
    pub fn remove_all(&self, p: &str) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("remove_all")?;
        let node = vol.resolve_path(p)?;
        vol.remove_node(node, false)
    }

    /// Rename a node in place.
    pub fn rename(&self, p: &str, name: &str) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("rename")?;
        let node = vol.resolve_path(p)?;
        vol.tree.rename(node, name)?;
        vol.persist_tree()
    }

    /// Set the permission mask on a subtree.
    pub fn set_permission(&self, p: &str, mask: u32) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("set_permission")?;
        let node = vol.resolve_path(p)?;
        vol.tree.set_permission(node, mask);
        vol.persist_tree()
    }

    /// Reorder a directory's children.
    pub fn sort(&self, p: &str, order: SortOrder) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("sort")?;
        let node = vol.resolve_path(p)?;
        vol.tree.sort_children(node, order)?;
        vol.persist_tree()
    }

    /// Read a whole file: open, drain, close.
    pub fn read(&self, p: &str) -> Result<Vec<u8>, VfsError> {
        let mut file = self.open_file(p, OpenFlags::READ)?;
        let data = file.read_to_end()?;
        file.close()?;
        Ok(data)
    }

    /// Write a whole file: open (creating if missing), write, close.
    pub fn write(&self, p: &str, data: &[u8]) -> Result<(), VfsError> {
        let mut file = self.open_file(p, OpenFlags::WRITE | OpenFlags::CREATE)?;
        file.write(data)?;
        file.close()
    }

    /// Read and deserialize a JSON file.
    pub fn read_json<T: DeserializeOwned>(&self, p: &str) -> Result<T, VfsError> {
        let data = self.read(p)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Serialize and write a JSON file.
    pub fn write_json<T: Serialize>(&self, p: &str, value: &T) -> Result<(), VfsError> {
        let data = serde_json::to_vec(value)?;
        self.write(p, &data)
    }

    /// One value from the volume configuration blob.
    pub fn config_get(&self, key: &str) -> Result<Option<Value>, VfsError> {
        let vol = lock_volume(&self.inner);
        vol.require_auth("config_get")?;
        Ok(vol.config.get(key).cloned())
    }

    /// Set one configuration value and persist the blob.
    pub fn config_set(&self, key: impl Into<String>, value: Value) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.require_auth("config_set")?;
        vol.config.insert(key.into(), value);
        vol.persist_config()
    }

    /// Release the underlying storage.
    pub fn close(&self) -> Result<(), VfsError> {
        let mut vol = lock_volume(&self.inner);
        vol.storage.close()?;
        Ok(())
    }
}
