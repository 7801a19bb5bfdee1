//! Path and name helpers.
//!
//! Paths are `/`-separated; empty segments are ignored, so `"/a//b/"` and
//! `"a/b"` name the same node. A single name may never itself contain the
//! separator.

use crate::error::VfsError;

/// The path separator.
pub const SEPARATOR: char = '/';

/// Split a path into its non-empty segments.
#[must_use]
pub fn segments(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// Split a path into its parent segments and the leaf name.
///
/// Returns `None` for the root (a path with no segments).
#[must_use]
pub fn parent_and_leaf(path: &str) -> Option<(Vec<&str>, &str)> {
    let mut segs = segments(path);
    let leaf = segs.pop()?;
    Some((segs, leaf))
}

/// Validate a single node name: non-empty and free of separators.
pub fn validate_name(name: &str) -> Result<(), VfsError> {
    if name.is_empty() {
        return Err(VfsError::invalid("name must not be empty"));
    }
    if name.contains(SEPARATOR) {
        return Err(VfsError::invalid(format!(
            "name '{name}' must not contain '{SEPARATOR}'"
        )));
    }
    Ok(())
}

/// Best-effort content type detection from a file name extension.
///
/// Unknown extensions map to `application/octet-stream`.
#[must_use]
pub fn mime_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_ignore_empty_parts() {
        assert_eq!(segments("/a//b/"), vec!["a", "b"]);
        assert_eq!(segments("a/b"), vec!["a", "b"]);
        assert!(segments("/").is_empty());
        assert!(segments("").is_empty());
    }

    #[test]
    fn parent_and_leaf_splits() {
        let (parent, leaf) = parent_and_leaf("/a/b/c.txt").unwrap();
        assert_eq!(parent, vec!["a", "b"]);
        assert_eq!(leaf, "c.txt");

        let (parent, leaf) = parent_and_leaf("top").unwrap();
        assert!(parent.is_empty());
        assert_eq!(leaf, "top");

        assert!(parent_and_leaf("/").is_none());
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("ok.txt").is_ok());
        assert!(matches!(validate_name(""), Err(VfsError::Invalid { .. })));
        assert!(matches!(
            validate_name("a/b"),
            Err(VfsError::Invalid { .. })
        ));
    }

    #[test]
    fn mime_detection() {
        assert_eq!(mime_type_for("photo.JPG"), "image/jpeg");
        assert_eq!(mime_type_for("notes.txt"), "text/plain");
        assert_eq!(mime_type_for("archive"), "application/octet-stream");
        assert_eq!(mime_type_for("weird.xyz"), "application/octet-stream");
    }
}
