//! Interfaces to the remote archive.
//!
//! The remote API client, the thing that knows how to list an archive and
//! open byte streams, lives outside this crate. The downloader consumes it
//! through the narrow traits defined here: [`RemoteRepository`] navigates to
//! a dataset and its lazy asset sequence, and [`RemoteAsset`] describes one
//! remote file with metadata and a ranged chunk-stream accessor.
//!
//! Implementations back these traits with whatever transport they like; the
//! [`http`](crate::http) module provides the pieces for HTTP-based ones.

use crate::error::TransportError;
use crate::utils::paths;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};

/// Lazy stream of byte chunks, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Lazy sequence of remote assets, consumed incrementally.
///
/// The sequence may be arbitrarily long; the orchestrator never materializes
/// it.
pub type AssetStream = BoxStream<'static, Result<Box<dyn RemoteAsset>, TransportError>>;

/// One remote file entry with metadata and a byte-stream accessor.
///
/// Values are immutable once obtained from the listing.
#[async_trait]
pub trait RemoteAsset: Send + Sync {
    /// Slash-separated path of the asset, relative to the archive root.
    fn path(&self) -> &str;

    /// Total size in bytes, when the listing knows it.
    fn size(&self) -> Option<u64>;

    /// Modification timestamp of the asset record.
    fn modified(&self) -> Option<DateTime<Utc>>;

    /// Raw metadata record for the asset.
    ///
    /// Expected to carry a `"digest"` sub-mapping (algorithm name to hex
    /// digest) and optionally a `"blobDateModified"` timestamp for the
    /// underlying content.
    async fn raw_metadata(&self) -> Result<serde_json::Value, TransportError>;

    /// Opens a chunk stream over the asset's bytes starting at `start`.
    fn download_stream(&self, start: u64) -> ByteStream;
}

/// A navigable remote resource: a dataset record plus its assets.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Connects and returns the dataset-level record (when there is one)
    /// and the lazy asset sequence.
    ///
    /// Any client connection acquired here is owned by the returned
    /// [`Navigation`] (directly or captured by its streams) and released
    /// when it is dropped.
    async fn navigate(&self) -> Result<Navigation, TransportError>;
}

/// The result of [`RemoteRepository::navigate`].
pub struct Navigation {
    /// Dataset-level metadata record, when the remote has one.
    pub dataset: Option<DatasetRecord>,
    /// The assets referred to by the selection.
    pub assets: AssetStream,
}

/// Dataset-level metadata, written to a single file at the output root.
#[derive(Debug, Clone)]
pub struct DatasetRecord {
    /// The raw metadata mapping.
    pub raw: serde_json::Value,
    /// Modification timestamp of the record.
    pub modified: Option<DateTime<Utc>>,
}

/// The shape of the requested selection, driving destination-path layout.
///
/// A closed set: every consumer matches exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The whole dataset; assets keep their full relative paths.
    Dataset,
    /// A single folder; assets land under the folder's basename.
    Folder {
        /// Slash-separated folder path within the archive.
        path: String,
    },
    /// A single file; only the basename is kept.
    File,
}

impl Selection {
    /// Resolves an asset path to its destination path relative to the output
    /// root.
    pub fn resolve(&self, asset_path: &str) -> PathBuf {
        let segs = paths::segments(asset_path);
        match self {
            Selection::Dataset => segs.iter().collect(),
            Selection::Folder { path } => {
                let folder = paths::segments(path);
                let rel = segs
                    .strip_prefix(folder.as_slice())
                    .unwrap_or(segs.as_slice());
                folder
                    .last()
                    .into_iter()
                    .chain(rel.iter())
                    .collect()
            }
            Selection::File => segs.last().map(PathBuf::from).unwrap_or_default(),
        }
    }

    /// Layout used by the sync pass: the remote path prefix corresponding to
    /// the local download directory, and that directory itself.
    ///
    /// `None` for single-file selections, which are never synced.
    pub(crate) fn sync_layout(&self, output_root: &Path) -> Option<(Vec<String>, PathBuf)> {
        match self {
            Selection::Dataset => Some((Vec::new(), output_root.to_path_buf())),
            Selection::Folder { path } => {
                let folder: Vec<String> =
                    paths::segments(path).into_iter().map(String::from).collect();
                let dir = folder
                    .last()
                    .map(|base| output_root.join(base))
                    .unwrap_or_else(|| output_root.to_path_buf());
                Some((folder, dir))
            }
            Selection::File => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_keeps_full_path() {
        let sel = Selection::Dataset;
        assert_eq!(sel.resolve("/sub/dir/a.bin"), PathBuf::from("sub/dir/a.bin"));
    }

    #[test]
    fn test_folder_uses_basename_prefix() {
        let sel = Selection::Folder {
            path: "sub/dir".into(),
        };
        assert_eq!(sel.resolve("sub/dir/a/b.bin"), PathBuf::from("dir/a/b.bin"));
    }

    #[test]
    fn test_file_keeps_basename_only() {
        let sel = Selection::File;
        assert_eq!(sel.resolve("sub/dir/a.bin"), PathBuf::from("a.bin"));
    }

    #[test]
    fn test_sync_layout() {
        let out = Path::new("/out");
        assert_eq!(
            Selection::Dataset.sync_layout(out),
            Some((vec![], PathBuf::from("/out")))
        );
        let (prefix, dir) = Selection::Folder {
            path: "sub/dir".into(),
        }
        .sync_layout(out)
        .unwrap();
        assert_eq!(prefix, vec!["sub".to_string(), "dir".to_string()]);
        assert_eq!(dir, PathBuf::from("/out/dir"));
        assert!(Selection::File.sync_layout(out).is_none());
    }
}
