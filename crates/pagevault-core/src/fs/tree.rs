//! The in-memory metadata tree: directories and files with parent/child
//! links and a cached serialized listing per directory.
//!
//! Nodes live in an arena (`Vec` of slots) and reference each other by
//! [`NodeId`]. The parent relation is a plain id lookup, never an owning
//! reference, which keeps path-to-root and invalidation walks O(depth)
//! without ownership cycles.
//!
//! Invalidation bubbles **up**: any mutation clears the cached listing of
//! the mutated node and every ancestor, because a directory's listing
//! embeds its whole subtree. Permission inheritance cascades **down** on
//! attach.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;
use uuid::Uuid;

use crate::error::VfsError;
use crate::fs::path;

/// Current Unix timestamp in seconds.
#[must_use]
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// Index of a node in the tree arena.
///
/// Arena indices may be reused after a node is removed; the stable
/// cross-reference for external callers is [`FileInfo::id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Metadata for one node in the tree.
///
/// For files, `size` is the authoritative stored byte length and `pages`
/// lists the content page identifiers in order. For directories, `pages`
/// is always empty and `size` is derived: the byte length of the serialized
/// listing, recomputed lazily.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Immutable opaque identifier, assigned at creation, never reused.
    pub id: String,
    /// Unique among siblings. The root's name is empty by convention.
    pub name: String,
    pub is_directory: bool,
    #[serde(default)]
    pub mime_type: String,
    #[serde(rename = "pageIds", default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub size: u64,
    /// Media duration in seconds, zero when unknown.
    #[serde(default)]
    pub duration: f64,
    pub created_at: i64,
    pub modified_at: i64,
    #[serde(default)]
    pub location: String,
    /// Inheritable permission bitmask.
    #[serde(default)]
    pub permission: u32,
    /// Opaque key/value bag.
    #[serde(default)]
    pub extra: Map<String, Value>,
    /// Optional thumbnail page id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl FileInfo {
    /// Fresh directory metadata with a generated id and current timestamps.
    #[must_use]
    pub fn new_directory(name: impl Into<String>) -> Self {
        let now = unix_now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            is_directory: true,
            mime_type: String::new(),
            pages: Vec::new(),
            size: 0,
            duration: 0.0,
            created_at: now,
            modified_at: now,
            location: String::new(),
            permission: 0,
            extra: Map::new(),
            thumbnail: None,
        }
    }

    /// Fresh file metadata with a generated id and current timestamps.
    #[must_use]
    pub fn new_file(name: impl Into<String>) -> Self {
        let name = name.into();
        let mime = path::mime_type_for(&name).to_string();
        Self {
            is_directory: false,
            mime_type: mime,
            ..Self::new_directory(name)
        }
    }
}

/// Recursive persisted form of a subtree: the node's metadata plus its
/// children, nested. This is the JSON shape stored (encrypted) under the
/// tree's reserved key.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TreeBlob {
    #[serde(flatten)]
    pub info: FileInfo,
    #[serde(default)]
    pub children: Vec<TreeBlob>,
}

/// Sort orders for directory children: a stable comparison table, not a
/// single default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    CreatedAsc,
    CreatedDesc,
    ModifiedAsc,
    ModifiedDesc,
    SizeAsc,
    SizeDesc,
    NameAsc,
    NameDesc,
    MimeAsc,
    MimeDesc,
}

#[derive(Debug)]
struct Node {
    info: FileInfo,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Cached serialized listing (directories only). `None` means stale.
    listing: Option<Vec<u8>>,
    /// Transient exclusivity flag for the life of the process; never
    /// persisted.
    busy: bool,
}

/// Arena-backed tree of [`FileInfo`] nodes.
#[derive(Debug)]
pub struct FileTree {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    root: NodeId,
}

impl Default for FileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTree {
    /// A fresh tree holding only the root directory.
    #[must_use]
    pub fn new() -> Self {
        let root = Node {
            info: FileInfo::new_directory(""),
            parent: None,
            children: Vec::new(),
            listing: None,
            busy: false,
        };
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        self.slots[id.0]
            .as_ref()
            .unwrap_or_else(|| unreachable!("stale NodeId {id:?}"))
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id.0]
            .as_mut()
            .unwrap_or_else(|| unreachable!("stale NodeId {id:?}"))
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            NodeId(slot)
        } else {
            self.slots.push(Some(node));
            NodeId(self.slots.len() - 1)
        }
    }

    /// Metadata of a node.
    #[must_use]
    pub fn info(&self, id: NodeId) -> &FileInfo {
        &self.node(id).info
    }

    pub(crate) fn info_mut(&mut self, id: NodeId) -> &mut FileInfo {
        &mut self.node_mut(id).info
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    #[must_use]
    pub fn is_busy(&self, id: NodeId) -> bool {
        self.node(id).busy
    }

    pub(crate) fn set_busy(&mut self, id: NodeId, busy: bool) {
        self.node_mut(id).busy = busy;
    }

    /// First busy node in the subtree rooted at `id`, by name.
    #[must_use]
    pub fn busy_in_subtree(&self, id: NodeId) -> Option<String> {
        if self.node(id).busy {
            return Some(self.node(id).info.name.clone());
        }
        self.node(id)
            .children
            .iter()
            .find_map(|&c| self.busy_in_subtree(c))
    }

    /// Reconstruct the absolute path of a node by walking to the root.
    #[must_use]
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = self.node(n);
            if node.parent.is_some() {
                parts.push(node.info.name.clone());
            }
            cur = node.parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Segment-by-segment descent from the root. The empty path and `"/"`
    /// resolve to the root.
    #[must_use]
    pub fn find_path(&self, p: &str) -> Option<NodeId> {
        let mut cur = self.root;
        for seg in path::segments(p) {
            cur = self.find_child(cur, seg)?;
        }
        Some(cur)
    }

    /// Child of `dir` with the given name.
    #[must_use]
    pub fn find_child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.node(dir)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).info.name == name)
    }

    /// Depth-first search across the whole tree for a node id.
    #[must_use]
    pub fn find_uuid(&self, uuid: &str) -> Option<NodeId> {
        self.find_uuid_from(self.root, uuid)
    }

    fn find_uuid_from(&self, from: NodeId, uuid: &str) -> Option<NodeId> {
        if self.node(from).info.id == uuid {
            return Some(from);
        }
        self.node(from)
            .children
            .iter()
            .find_map(|&c| self.find_uuid_from(c, uuid))
    }

    /// Disambiguate `base` among the children of `dir`: appends `-1`, `-2`,
    /// … before the extension until the name is unique.
    #[must_use]
    pub fn distinct_name(&self, dir: NodeId, base: &str) -> String {
        if self.find_child(dir, base).is_none() {
            return base.to_string();
        }
        let (stem, ext) = match base.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (base, None),
        };
        for i in 1.. {
            let candidate = match ext {
                Some(ext) => format!("{stem}-{i}.{ext}"),
                None => format!("{stem}-{i}"),
            };
            if self.find_child(dir, &candidate).is_none() {
                return candidate;
            }
        }
        unreachable!("ran out of disambiguation suffixes")
    }

    /// Insert a fresh node under `dir`.
    ///
    /// The new subtree inherits the parent's permission mask. Fails with
    /// `Conflict` on a sibling name collision.
    pub fn insert(&mut self, dir: NodeId, mut info: FileInfo) -> Result<NodeId, VfsError> {
        path::validate_name(&info.name)?;
        if !self.node(dir).info.is_directory {
            return Err(VfsError::invalid(format!(
                "'{}' is not a directory",
                self.path_of(dir)
            )));
        }
        if self.find_child(dir, &info.name).is_some() {
            return Err(VfsError::conflict(format!(
                "'{}' already exists in '{}'",
                info.name,
                self.path_of(dir)
            )));
        }
        info.permission = self.node(dir).info.permission;
        trace!(name = %info.name, parent = %self.path_of(dir), "inserting node");
        let id = self.alloc(Node {
            info,
            parent: Some(dir),
            children: Vec::new(),
            listing: None,
            busy: false,
        });
        self.node_mut(dir).children.push(id);
        self.node_mut(dir).info.modified_at = unix_now();
        self.invalidate(dir);
        Ok(id)
    }

    /// Reparent `child` under `dir`.
    ///
    /// Idempotent: attaching a node already parented to `dir` is a no-op.
    /// Always detaches from the previous parent first, then cascades the new
    /// parent's permission down the moved subtree.
    pub fn attach(&mut self, child: NodeId, dir: NodeId) -> Result<(), VfsError> {
        if child == self.root {
            return Err(VfsError::invalid("cannot move the root"));
        }
        if !self.node(dir).info.is_directory {
            return Err(VfsError::invalid(format!(
                "'{}' is not a directory",
                self.path_of(dir)
            )));
        }
        if self.node(child).parent == Some(dir) {
            return Ok(());
        }
        // Reject moving a directory beneath its own descendant.
        let mut cur = Some(dir);
        while let Some(n) = cur {
            if n == child {
                return Err(VfsError::invalid(format!(
                    "cannot move '{}' into its own subtree",
                    self.path_of(child)
                )));
            }
            cur = self.node(n).parent;
        }
        let name = self.node(child).info.name.clone();
        if self.find_child(dir, &name).is_some() {
            return Err(VfsError::conflict(format!(
                "'{name}' already exists in '{}'",
                self.path_of(dir)
            )));
        }
        if let Some(old) = self.node(child).parent {
            self.node_mut(old).children.retain(|&c| c != child);
            self.node_mut(old).info.modified_at = unix_now();
            self.invalidate(old);
        }
        self.node_mut(child).parent = Some(dir);
        self.node_mut(dir).children.push(child);
        let mask = self.node(dir).info.permission;
        self.cascade_permission(child, mask);
        let now = unix_now();
        self.node_mut(child).info.modified_at = now;
        self.node_mut(dir).info.modified_at = now;
        self.invalidate(child);
        Ok(())
    }

    /// Rename a node. Renaming to the current name is a no-op success.
    pub fn rename(&mut self, id: NodeId, name: &str) -> Result<(), VfsError> {
        if id == self.root {
            return Err(VfsError::invalid("cannot rename the root"));
        }
        path::validate_name(name)?;
        if self.node(id).info.name == name {
            return Ok(());
        }
        let parent = self
            .node(id)
            .parent
            .unwrap_or_else(|| unreachable!("non-root node without parent"));
        if self.find_child(parent, name).is_some() {
            return Err(VfsError::conflict(format!(
                "'{name}' already exists in '{}'",
                self.path_of(parent)
            )));
        }
        self.node_mut(id).info.name = name.to_string();
        self.node_mut(id).info.modified_at = unix_now();
        self.invalidate(id);
        Ok(())
    }

    /// Set the permission mask on a node, cascading down its subtree.
    pub fn set_permission(&mut self, id: NodeId, mask: u32) {
        self.cascade_permission(id, mask);
        self.node_mut(id).info.modified_at = unix_now();
        self.invalidate(id);
    }

    fn cascade_permission(&mut self, id: NodeId, mask: u32) {
        self.node_mut(id).info.permission = mask;
        let children = self.node(id).children.clone();
        for c in children {
            self.cascade_permission(c, mask);
        }
    }

    /// Bump a node's modified timestamp and invalidate its listing chain.
    pub fn touch(&mut self, id: NodeId) {
        self.node_mut(id).info.modified_at = unix_now();
        self.invalidate(id);
    }

    /// Discard cached listings from `id` up to the root.
    ///
    /// Every directory's listing embeds all descendant metadata, so a
    /// mutation anywhere makes the root's cache stale.
    pub fn invalidate(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(n) = cur {
            self.node_mut(n).listing = None;
            cur = self.node(n).parent;
        }
    }

    /// Serialized listing of a directory, recomputed if stale. Updates the
    /// directory's derived size as a side effect.
    pub fn listing(&mut self, dir: NodeId) -> Result<Vec<u8>, VfsError> {
        if !self.node(dir).info.is_directory {
            return Err(VfsError::invalid(format!(
                "'{}' is not a directory",
                self.path_of(dir)
            )));
        }
        if let Some(cached) = &self.node(dir).listing {
            return Ok(cached.clone());
        }
        let blob = serde_json::to_vec(&self.to_blob(dir))?;
        self.node_mut(dir).info.size = blob.len() as u64;
        self.node_mut(dir).listing = Some(blob.clone());
        Ok(blob)
    }

    /// Remove the subtree rooted at `id`, returning every page id reachable
    /// from it (content pages and thumbnails) so the caller can delete them
    /// from storage.
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<String>, VfsError> {
        if id == self.root {
            return Err(VfsError::invalid("cannot remove the root"));
        }
        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|&c| c != id);
            self.node_mut(parent).info.modified_at = unix_now();
            self.invalidate(parent);
        }
        let mut pages = Vec::new();
        self.free_subtree(id, &mut pages);
        Ok(pages)
    }

    fn free_subtree(&mut self, id: NodeId, pages: &mut Vec<String>) {
        let node = self.slots[id.0]
            .take()
            .unwrap_or_else(|| unreachable!("stale NodeId {id:?}"));
        pages.extend(node.info.pages);
        pages.extend(node.info.thumbnail);
        for c in node.children {
            self.free_subtree(c, pages);
        }
        self.free.push(id.0);
    }

    /// Every page id reachable from the whole tree, content pages and
    /// thumbnails alike.
    #[must_use]
    pub(crate) fn all_page_ids(&self) -> Vec<String> {
        let mut pages = Vec::new();
        self.collect_page_ids(self.root, &mut pages);
        pages
    }

    fn collect_page_ids(&self, id: NodeId, pages: &mut Vec<String>) {
        let node = self.node(id);
        pages.extend(node.info.pages.iter().cloned());
        pages.extend(node.info.thumbnail.iter().cloned());
        for &c in &node.children {
            self.collect_page_ids(c, pages);
        }
    }

    /// Sort the children of a directory. The sort is stable.
    pub fn sort_children(&mut self, dir: NodeId, order: SortOrder) -> Result<(), VfsError> {
        if !self.node(dir).info.is_directory {
            return Err(VfsError::invalid(format!(
                "'{}' is not a directory",
                self.path_of(dir)
            )));
        }
        let mut children = self.node(dir).children.clone();
        children.sort_by(|&a, &b| {
            let (a, b) = (&self.node(a).info, &self.node(b).info);
            match order {
                SortOrder::CreatedAsc => a.created_at.cmp(&b.created_at),
                SortOrder::CreatedDesc => b.created_at.cmp(&a.created_at),
                SortOrder::ModifiedAsc => a.modified_at.cmp(&b.modified_at),
                SortOrder::ModifiedDesc => b.modified_at.cmp(&a.modified_at),
                SortOrder::SizeAsc => a.size.cmp(&b.size),
                SortOrder::SizeDesc => b.size.cmp(&a.size),
                SortOrder::NameAsc => a.name.cmp(&b.name),
                SortOrder::NameDesc => b.name.cmp(&a.name),
                SortOrder::MimeAsc => a.mime_type.cmp(&b.mime_type),
                SortOrder::MimeDesc => b.mime_type.cmp(&a.mime_type),
            }
        });
        self.node_mut(dir).children = children;
        self.invalidate(dir);
        Ok(())
    }

    /// Recursive persisted form of the subtree rooted at `id`.
    pub(crate) fn to_blob(&self, id: NodeId) -> TreeBlob {
        let node = self.node(id);
        TreeBlob {
            info: node.info.clone(),
            children: node.children.iter().map(|&c| self.to_blob(c)).collect(),
        }
    }

    /// Rebuild a tree from its persisted form.
    pub(crate) fn from_blob(blob: TreeBlob) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
        };
        let root = tree.insert_blob(blob, None);
        tree.root = root;
        tree
    }

    fn insert_blob(&mut self, blob: TreeBlob, parent: Option<NodeId>) -> NodeId {
        let id = self.alloc(Node {
            info: blob.info,
            parent,
            children: Vec::new(),
            listing: None,
            busy: false,
        });
        for child in blob.children {
            let c = self.insert_blob(child, Some(id));
            self.node_mut(id).children.push(c);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(names: &[&str]) -> (FileTree, Vec<NodeId>) {
        let mut tree = FileTree::new();
        let root = tree.root();
        let ids = names
            .iter()
            .map(|n| {
                let info = if n.contains('.') {
                    FileInfo::new_file(*n)
                } else {
                    FileInfo::new_directory(*n)
                };
                tree.insert(root, info).unwrap()
            })
            .collect();
        (tree, ids)
    }

    #[test]
    fn root_has_empty_name_and_no_parent() {
        let tree = FileTree::new();
        assert_eq!(tree.info(tree.root()).name, "");
        assert!(tree.parent(tree.root()).is_none());
        assert!(tree.info(tree.root()).is_directory);
    }

    #[test]
    fn insert_rejects_duplicate_sibling_names() {
        let (mut tree, _) = tree_with(&["docs"]);
        let root = tree.root();
        let err = tree.insert(root, FileInfo::new_directory("docs")).unwrap_err();
        assert!(matches!(err, VfsError::Conflict { .. }));
    }

    #[test]
    fn find_path_descends_segments() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let a = tree.insert(root, FileInfo::new_directory("a")).unwrap();
        let b = tree.insert(a, FileInfo::new_directory("b")).unwrap();
        let f = tree.insert(b, FileInfo::new_file("c.txt")).unwrap();
        assert_eq!(tree.find_path("/a/b/c.txt"), Some(f));
        assert_eq!(tree.find_path("a//b/"), Some(b));
        assert_eq!(tree.find_path("/"), Some(root));
        assert_eq!(tree.find_path("/a/missing"), None);
        assert_eq!(tree.path_of(f), "/a/b/c.txt");
    }

    #[test]
    fn find_uuid_searches_depth_first() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let a = tree.insert(root, FileInfo::new_directory("a")).unwrap();
        let f = tree.insert(a, FileInfo::new_file("x.bin")).unwrap();
        let uuid = tree.info(f).id.clone();
        assert_eq!(tree.find_uuid(&uuid), Some(f));
        assert_eq!(tree.find_uuid("not-a-real-id"), None);
    }

    #[test]
    fn distinct_name_appends_counter_before_extension() {
        let (mut tree, _) = tree_with(&["a.txt"]);
        let root = tree.root();
        assert_eq!(tree.distinct_name(root, "b.txt"), "b.txt");
        assert_eq!(tree.distinct_name(root, "a.txt"), "a-1.txt");
        tree.insert(root, FileInfo::new_file("a-1.txt")).unwrap();
        assert_eq!(tree.distinct_name(root, "a.txt"), "a-2.txt");
        tree.insert(root, FileInfo::new_directory("plain")).unwrap();
        assert_eq!(tree.distinct_name(root, "plain"), "plain-1");
    }

    #[test]
    fn attach_is_idempotent() {
        let (mut tree, ids) = tree_with(&["src", "dst"]);
        let (src, dst) = (ids[0], ids[1]);
        let f = tree.insert(src, FileInfo::new_file("f.txt")).unwrap();
        tree.attach(f, dst).unwrap();
        assert_eq!(tree.parent(f), Some(dst));
        assert_eq!(tree.children(dst).len(), 1);
        assert!(tree.children(src).is_empty());
        // Second attach to the same parent changes nothing.
        tree.attach(f, dst).unwrap();
        assert_eq!(tree.children(dst).len(), 1);
    }

    #[test]
    fn attach_inherits_permission_downward() {
        let (mut tree, ids) = tree_with(&["src", "dst"]);
        let (src, dst) = (ids[0], ids[1]);
        tree.set_permission(dst, 0o640);
        let sub = tree.insert(src, FileInfo::new_directory("sub")).unwrap();
        let f = tree.insert(sub, FileInfo::new_file("f.txt")).unwrap();
        tree.attach(sub, dst).unwrap();
        assert_eq!(tree.info(sub).permission, 0o640);
        assert_eq!(tree.info(f).permission, 0o640);
    }

    #[test]
    fn attach_rejects_cycles() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let a = tree.insert(root, FileInfo::new_directory("a")).unwrap();
        let b = tree.insert(a, FileInfo::new_directory("b")).unwrap();
        assert!(matches!(tree.attach(a, b), Err(VfsError::Invalid { .. })));
    }

    #[test]
    fn rename_validation() {
        let (mut tree, ids) = tree_with(&["a.txt", "b.txt"]);
        let a = ids[0];
        assert!(matches!(
            tree.rename(a, ""),
            Err(VfsError::Invalid { .. })
        ));
        assert!(matches!(
            tree.rename(a, "x/y"),
            Err(VfsError::Invalid { .. })
        ));
        assert!(matches!(
            tree.rename(a, "b.txt"),
            Err(VfsError::Conflict { .. })
        ));
        let root = tree.root();
        assert!(matches!(
            tree.rename(root, "newroot"),
            Err(VfsError::Invalid { .. })
        ));
        // Same name is a no-op success.
        tree.rename(a, "a.txt").unwrap();
        tree.rename(a, "c.txt").unwrap();
        assert_eq!(tree.info(a).name, "c.txt");
    }

    #[test]
    fn listing_caches_until_invalidated() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let first = tree.listing(root).unwrap();
        let cached = tree.listing(root).unwrap();
        assert_eq!(first, cached);
        tree.insert(root, FileInfo::new_file("new.txt")).unwrap();
        let fresh = tree.listing(root).unwrap();
        assert_ne!(first, fresh);
        assert_eq!(tree.info(root).size, fresh.len() as u64);
    }

    #[test]
    fn mutation_deep_in_the_tree_staleness_reaches_the_root() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let a = tree.insert(root, FileInfo::new_directory("a")).unwrap();
        let b = tree.insert(a, FileInfo::new_directory("b")).unwrap();
        let root_listing = tree.listing(root).unwrap();
        tree.insert(b, FileInfo::new_file("deep.txt")).unwrap();
        assert_ne!(tree.listing(root).unwrap(), root_listing);
    }

    #[test]
    fn remove_collects_all_subtree_pages() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let dir = tree.insert(root, FileInfo::new_directory("d")).unwrap();
        let f = tree.insert(dir, FileInfo::new_file("f.bin")).unwrap();
        tree.info_mut(f).pages = vec!["p1".into(), "p2".into()];
        tree.info_mut(f).thumbnail = Some("t1".into());
        let mut pages = tree.remove(dir).unwrap();
        pages.sort();
        assert_eq!(pages, vec!["p1", "p2", "t1"]);
        assert_eq!(tree.find_path("/d"), None);
    }

    #[test]
    fn remove_root_is_rejected() {
        let mut tree = FileTree::new();
        let root = tree.root();
        assert!(matches!(tree.remove(root), Err(VfsError::Invalid { .. })));
    }

    #[test]
    fn sort_orders() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let b = tree.insert(root, FileInfo::new_file("b.txt")).unwrap();
        let a = tree.insert(root, FileInfo::new_file("a.txt")).unwrap();
        tree.info_mut(a).size = 10;
        tree.info_mut(b).size = 5;

        tree.sort_children(root, SortOrder::NameAsc).unwrap();
        assert_eq!(tree.children(root), &[a, b]);
        tree.sort_children(root, SortOrder::NameDesc).unwrap();
        assert_eq!(tree.children(root), &[b, a]);
        tree.sort_children(root, SortOrder::SizeAsc).unwrap();
        assert_eq!(tree.children(root), &[b, a]);
        tree.sort_children(root, SortOrder::SizeDesc).unwrap();
        assert_eq!(tree.children(root), &[a, b]);
    }

    #[test]
    fn blob_round_trip_preserves_structure() {
        let mut tree = FileTree::new();
        let root = tree.root();
        let a = tree.insert(root, FileInfo::new_directory("a")).unwrap();
        let f = tree.insert(a, FileInfo::new_file("f.txt")).unwrap();
        tree.info_mut(f).pages = vec!["page-1".into()];
        tree.info_mut(f).size = 17;

        let json = serde_json::to_vec(&tree.to_blob(root)).unwrap();
        let restored = FileTree::from_blob(serde_json::from_slice(&json).unwrap());
        let rf = restored.find_path("/a/f.txt").unwrap();
        assert_eq!(restored.info(rf).pages, vec!["page-1"]);
        assert_eq!(restored.info(rf).size, 17);
        assert_eq!(restored.info(rf).id, tree.info(f).id);
    }

    #[test]
    fn serialized_fields_use_wire_names() {
        let info = FileInfo::new_file("x.png");
        let v: Value = serde_json::to_value(&info).unwrap();
        assert!(v.get("isDirectory").is_some());
        assert!(v.get("mimeType").is_some());
        assert!(v.get("pageIds").is_some());
        assert!(v.get("createdAt").is_some());
        assert!(v.get("modifiedAt").is_some());
        assert_eq!(v["mimeType"], "image/png");
    }

    #[test]
    fn busy_flag_is_per_node() {
        let (mut tree, ids) = tree_with(&["a.txt"]);
        assert!(!tree.is_busy(ids[0]));
        tree.set_busy(ids[0], true);
        assert!(tree.is_busy(ids[0]));
        assert_eq!(tree.busy_in_subtree(tree.root()), Some("a.txt".into()));
        tree.set_busy(ids[0], false);
        assert!(tree.busy_in_subtree(tree.root()).is_none());
    }
}
