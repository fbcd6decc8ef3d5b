//! Disposition of destinations that already exist.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Policy applied when the destination path already exists locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExistingFile {
    /// Fail the whole run.
    #[default]
    Error,
    /// Keep the local file, report `skipped`.
    Skip,
    /// Re-download unconditionally.
    Overwrite,
    /// Re-download unless size and content-addressed digest both match the
    /// remote asset.
    OverwriteDifferent,
    /// Re-download unless modification time and size both match the remote
    /// asset.
    Refresh,
}

impl ExistingFile {
    /// Stable name, as accepted by configuration surfaces.
    pub fn name(self) -> &'static str {
        match self {
            ExistingFile::Error => "error",
            ExistingFile::Skip => "skip",
            ExistingFile::Overwrite => "overwrite",
            ExistingFile::OverwriteDifferent => "overwrite-different",
            ExistingFile::Refresh => "refresh",
        }
    }
}

impl fmt::Display for ExistingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExistingFile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(ExistingFile::Error),
            "skip" => Ok(ExistingFile::Skip),
            "overwrite" => Ok(ExistingFile::Overwrite),
            "overwrite-different" => Ok(ExistingFile::OverwriteDifferent),
            "refresh" => Ok(ExistingFile::Refresh),
            other => Err(format!("unknown existing-file policy: {other:?}")),
        }
    }
}

/// Marker directory identifying version-control-managed immutable storage.
///
/// Annexed working trees keep file content as read-only objects under this
/// directory; refreshing files in place would corrupt them, so `refresh`
/// refuses to run when the marker is present at the output root.
pub(crate) fn immutable_store_marker(toplevel: &Path) -> PathBuf {
    toplevel.join(".git").join("annex")
}
