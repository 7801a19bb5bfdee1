//! Open file handles: paged reads, buffered page-aligned writes, seek.
//!
//! A handle is created already bound to one tree node with that node's busy
//! flag taken; closing (or dropping) the handle releases the flag exactly
//! once. A write session always replaces prior content from offset zero;
//! there is no in-place partial overwrite.

use std::cmp::min;
use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::VfsError;
use crate::fs::tree::{FileInfo, NodeId};
use crate::volume::{lock_volume, Volume};

/// Open flags: a bitmask selecting read-only, write-only, and create.
///
/// Exactly one of [`OpenFlags::READ`] and [`OpenFlags::WRITE`] must be set;
/// [`OpenFlags::CREATE`] may be combined with either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(u8);

impl OpenFlags {
    pub const READ: OpenFlags = OpenFlags(0b001);
    pub const WRITE: OpenFlags = OpenFlags(0b010);
    pub const CREATE: OpenFlags = OpenFlags(0b100);

    /// True if every flag in `other` is set in `self`.
    #[must_use]
    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

/// The direction a handle was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Read,
    Write,
}

/// An open read or write cursor bound to one tree node.
///
/// Reads address content by `offset / page_size`, fetching and decrypting
/// one page at a time; a single read call crosses page boundaries as needed
/// until the caller's buffer is filled or end-of-content is reached (a read
/// of 0 bytes). Reading a directory handle returns the bytes of its cached
/// serialized listing.
///
/// Writes buffer in memory and flush a page to storage whenever a full page
/// has accumulated; the remainder is flushed on [`File::close`], which also
/// records the final size and persists the tree.
pub struct File {
    volume: Arc<Mutex<Volume>>,
    node: NodeId,
    mode: Mode,
    offset: u64,
    buf: Vec<u8>,
    written: u64,
    truncated: bool,
    closed: bool,
}

impl File {
    /// The caller must already have marked `node` busy.
    pub(crate) fn open(volume: Arc<Mutex<Volume>>, node: NodeId, mode: Mode) -> Self {
        Self {
            volume,
            node,
            mode,
            offset: 0,
            buf: Vec::new(),
            written: 0,
            truncated: false,
            closed: false,
        }
    }

    /// Current cursor offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Snapshot of the underlying node's metadata.
    #[must_use]
    pub fn stat(&self) -> FileInfo {
        let vol = lock_volume(&self.volume);
        vol.tree.info(self.node).clone()
    }

    /// Read up to `buf.len()` bytes at the current offset.
    ///
    /// Returns the number of bytes read; `Ok(0)` signals end-of-content,
    /// distinct from a partial read (which returns a non-zero count smaller
    /// than the buffer).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        if self.mode != Mode::Read {
            return Err(VfsError::invalid("handle is not open for reading"));
        }
        let mut vol = lock_volume(&self.volume);
        let (is_directory, size, pages) = {
            let info = vol.tree.info(self.node);
            (info.is_directory, info.size, info.pages.clone())
        };

        if is_directory {
            let listing = vol.tree.listing(self.node)?;
            let start = min(self.offset as usize, listing.len());
            let n = min(buf.len(), listing.len() - start);
            buf[..n].copy_from_slice(&listing[start..start + n]);
            self.offset += n as u64;
            return Ok(n);
        }

        let page_size = vol.page_size;
        let mut copied = 0usize;
        while copied < buf.len() && self.offset < size {
            let index = (self.offset / page_size) as usize;
            let Some(page_id) = pages.get(index) else {
                // The tree claims more content than it has pages for.
                return Err(VfsError::invalid(format!(
                    "missing page {index} for '{}'",
                    vol.tree.path_of(self.node)
                )));
            };
            let page = vol.read_page(page_id)?;
            let in_page = (self.offset % page_size) as usize;
            let left_in_content = (size - self.offset) as usize;
            let avail = min(page.len().saturating_sub(in_page), left_in_content);
            if avail == 0 {
                break;
            }
            let n = min(avail, buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&page[in_page..in_page + n]);
            copied += n;
            self.offset += n as u64;
        }
        Ok(copied)
    }

    /// Read everything from the current offset to end-of-content.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>, VfsError> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Append bytes to the write session.
    ///
    /// Whenever the internal buffer holds at least one full page, the page
    /// is encrypted and flushed to storage. The first flush of the session
    /// truncates the node's previous page list and size to zero.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, VfsError> {
        if self.mode != Mode::Write {
            return Err(VfsError::invalid("handle is not open for writing"));
        }
        self.buf.extend_from_slice(data);
        let volume = Arc::clone(&self.volume);
        let mut vol = lock_volume(&volume);
        let page_size = vol.page_size as usize;
        while self.buf.len() >= page_size {
            let page: Vec<u8> = self.buf.drain(..page_size).collect();
            self.flush_page(&mut vol, &page)?;
        }
        Ok(data.len())
    }

    /// Reposition a read handle.
    ///
    /// Seeking past end-of-content moves the cursor and reports the
    /// condition via [`VfsError::EndOfContent`], which carries the offset
    /// the handle now reports.
    pub fn seek(&mut self, pos: u64) -> Result<u64, VfsError> {
        if self.mode != Mode::Read {
            return Err(VfsError::invalid("seek is only valid on read handles"));
        }
        let mut vol = lock_volume(&self.volume);
        let size = if vol.tree.info(self.node).is_directory {
            vol.tree.listing(self.node)?.len() as u64
        } else {
            vol.tree.info(self.node).size
        };
        self.offset = pos;
        if pos > size {
            return Err(VfsError::EndOfContent { offset: pos });
        }
        Ok(pos)
    }

    /// Close the handle.
    ///
    /// For write handles this flushes any remainder shorter than a page,
    /// records the final size on the node, and persists the whole tree.
    /// The busy flag is released exactly once regardless of outcome.
    pub fn close(mut self) -> Result<(), VfsError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), VfsError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let volume = Arc::clone(&self.volume);
        let mut vol = lock_volume(&volume);
        let result = self.finalize(&mut vol);
        vol.tree.set_busy(self.node, false);
        result
    }

    fn finalize(&mut self, vol: &mut Volume) -> Result<(), VfsError> {
        if self.mode != Mode::Write {
            return Ok(());
        }
        // A write session with zero bytes still replaces prior content.
        self.ensure_truncated(vol);
        if !self.buf.is_empty() {
            let remainder = std::mem::take(&mut self.buf);
            self.flush_page(vol, &remainder)?;
        }
        vol.tree.info_mut(self.node).size = self.written;
        vol.tree.touch(self.node);
        debug!(
            path = %vol.tree.path_of(self.node),
            size = self.written,
            pages = vol.tree.info(self.node).pages.len(),
            "write session closed"
        );
        vol.persist_tree()
    }

    fn ensure_truncated(&mut self, vol: &mut Volume) {
        if self.truncated {
            return;
        }
        let old = std::mem::take(&mut vol.tree.info_mut(self.node).pages);
        vol.tree.info_mut(self.node).size = 0;
        for id in &old {
            vol.delete_page_best_effort(id);
        }
        self.truncated = true;
    }

    fn flush_page(&mut self, vol: &mut Volume, bytes: &[u8]) -> Result<(), VfsError> {
        self.ensure_truncated(vol);
        let id = vol.write_page(bytes)?;
        vol.tree.info_mut(self.node).pages.push(id);
        self.written += bytes.len() as u64;
        Ok(())
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("node", &self.node)
            .field("mode", &self.mode)
            .field("offset", &self.offset)
            .field("buffered", &self.buf.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for File {
    /// A dropped handle releases the busy flag so abnormal termination can
    /// never leave a node permanently busy. Buffered write data that was
    /// never closed is discarded.
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut vol = lock_volume(&self.volume);
        if self.mode == Mode::Write && (!self.buf.is_empty() || self.written > 0) {
            warn!(
                path = %vol.tree.path_of(self.node),
                buffered = self.buf.len(),
                "write handle dropped without close; session discarded"
            );
        }
        vol.tree.set_busy(self.node, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_contain() {
        let f = OpenFlags::WRITE | OpenFlags::CREATE;
        assert!(f.contains(OpenFlags::WRITE));
        assert!(f.contains(OpenFlags::CREATE));
        assert!(!f.contains(OpenFlags::READ));
        assert!(f.contains(OpenFlags::WRITE | OpenFlags::CREATE));
    }
}
