//! Relative-path handling for asset paths.
//!
//! Remote listings address assets with slash-separated relative paths. These
//! helpers normalize them lexically (dropping empty and `.` segments and
//! resolving `..`) before they are mapped onto the local tree, and convert
//! local paths back into the slash-separated form used to compare against
//! the remote set.

use std::path::{Path, PathBuf};

/// Splits a slash-separated path into normalized segments.
///
/// Leading slashes and `.` segments are dropped; `..` is resolved lexically
/// and never escapes the root.
pub fn segments(path: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    out
}

/// Normalizes a slash-separated asset path into a relative [`PathBuf`].
pub fn normalize_rel(path: &str) -> PathBuf {
    segments(path).iter().collect()
}

/// Renders a relative path with forward slashes, regardless of platform.
pub fn to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
