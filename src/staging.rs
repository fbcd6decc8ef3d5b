//! Staging directories for resumable downloads.
//!
//! Every in-flight transfer owns a sidecar directory next to its final
//! destination, `<final>.dlstage/`, holding three entries:
//!
//! - `file`: the partially downloaded bytes,
//! - `checksum`: a JSON manifest mapping algorithm names to the digests the
//!   partial data was downloaded against,
//! - `lock`: an advisory lock file taken exclusively for the lifetime of the
//!   transfer.
//!
//! The manifest decides whether a surviving partial file belongs to the same
//! expected content (resume by appending) or to content that has since
//! changed on the remote (discard and restart). The final path is only ever
//! produced by renaming the fully written staging file over it, so an
//! interrupted process leaves the destination absent or unchanged, never
//! truncated.
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use caravan::digest::DigestAlgorithm;
//! use caravan::staging::StagingHandle;
//!
//! # async fn example() -> caravan::Result<()> {
//! let mut expected = BTreeMap::new();
//! expected.insert(DigestAlgorithm::Sha256, "aa".repeat(32));
//! let mut stage = StagingHandle::open("out/data.bin", &expected).await?;
//! let resume_from = stage.offset();
//! stage.append(b"...bytes from the network...").await?;
//! stage.commit().await?;
//! # Ok(())
//! # }
//! ```

use crate::digest::DigestAlgorithm;
use crate::error::{Error, Result};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Suffix appended to the destination file name to form the staging directory.
pub const STAGING_SUFFIX: &str = "dlstage";

const PARTIAL_FILE: &str = "file";
const MANIFEST_FILE: &str = "checksum";
const LOCK_FILE: &str = "lock";

/// Computes the staging directory path for a final destination path.
pub fn staging_dir_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(STAGING_SUFFIX);
    final_path.with_file_name(name)
}

/// An open, exclusively locked staging directory.
///
/// The advisory lock and the partial-file handle are tied to this value:
/// every exit path releases them, either explicitly through [`commit`] /
/// [`abort`] or implicitly when the handle is dropped (e.g. on cancellation),
/// in which case the partial data stays on disk for a later resume.
///
/// [`commit`]: StagingHandle::commit
/// [`abort`]: StagingHandle::abort
pub struct StagingHandle {
    final_path: PathBuf,
    dir: PathBuf,
    /// Keeps the exclusive lock; released when the handle goes away.
    lock: std::fs::File,
    file: tokio::fs::File,
    offset: u64,
}

impl StagingHandle {
    /// Opens (or creates) the staging directory for `final_path` and acquires
    /// its exclusive lock.
    ///
    /// Fails with [`Error::LockHeld`] when another process is already
    /// transferring to the same destination; that aborts this one file, not
    /// the whole run.
    ///
    /// When a persisted digest manifest intersects `expected` and all
    /// intersecting values match, the partial file is opened for append and
    /// [`offset`](StagingHandle::offset) reports its length; otherwise any
    /// partial data is discarded and a fresh file is started. The requested
    /// digests are persisted either way.
    pub async fn open(
        final_path: impl Into<PathBuf>,
        expected: &BTreeMap<DigestAlgorithm, String>,
    ) -> Result<Self> {
        let final_path = final_path.into();
        let dir = staging_dir_for(&final_path);
        tokio::fs::create_dir_all(&dir).await?;

        let lock = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        match lock.try_lock() {
            Ok(()) => {}
            Err(std::fs::TryLockError::WouldBlock) => {
                return Err(Error::LockHeld(final_path));
            }
            Err(std::fs::TryLockError::Error(source)) => return Err(source.into()),
        }

        let expected_by_name: BTreeMap<String, String> = expected
            .iter()
            .map(|(algorithm, digest)| (algorithm.name().to_owned(), digest.clone()))
            .collect();

        let manifest_path = dir.join(MANIFEST_FILE);
        let recorded = load_manifest(&manifest_path).await;
        let matching: Vec<&String> = expected_by_name
            .keys()
            .filter(|name| recorded.contains_key(*name))
            .collect();
        let resume = !matching.is_empty()
            && matching
                .iter()
                .all(|name| recorded[*name] == expected_by_name[*name]);

        let partial = dir.join(PARTIAL_FILE);
        let file = if resume {
            debug!(path = %partial.display(), "digest manifest matches; resuming download");
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&partial)
                .await?
        } else {
            if recorded.is_empty() {
                debug!(path = %partial.display(), "starting new download");
            } else {
                debug!(
                    path = %partial.display(),
                    "digest manifest does not match; discarding partial data"
                );
            }
            match tokio::fs::remove_file(&partial).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tokio::fs::File::create(&partial).await?
        };

        let manifest = serde_json::to_vec(&expected_by_name)?;
        tokio::fs::write(&manifest_path, manifest).await?;

        let offset = file.metadata().await?.len();
        Ok(Self {
            final_path,
            dir,
            lock,
            file,
            offset,
        })
    }

    /// Number of bytes already present in the partial file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Path of the partial file inside the staging directory.
    pub fn partial_path(&self) -> PathBuf {
        self.dir.join(PARTIAL_FILE)
    }

    /// Path of the staging directory itself.
    pub fn staging_dir(&self) -> &Path {
        &self.dir
    }

    /// Appends a chunk to the end of the partial file.
    pub async fn append(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        self.offset += chunk.len() as u64;
        Ok(())
    }

    /// Promotes the fully written, fully verified partial file to the final
    /// path.
    ///
    /// The promotion is a single filesystem rename (never copy+delete), so a
    /// reader of the final path observes either the old state or the complete
    /// new file. The lock is released and the staging directory removed
    /// afterwards.
    pub async fn commit(mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        let partial = self.partial_path();
        let Self {
            final_path,
            dir,
            lock,
            file,
            ..
        } = self;
        drop(file);
        tokio::fs::rename(&partial, &final_path).await?;
        if let Err(e) = lock.unlock() {
            warn!(path = %dir.display(), "failed to release download lock: {e}");
        }
        drop(lock);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(path = %dir.display(), "failed to remove staging directory: {e}");
        }
        Ok(())
    }

    /// Releases the lock and file handle, keeping the partial data on disk
    /// for a future resume. Never deletes anything.
    pub async fn abort(mut self) {
        if let Err(e) = self.file.flush().await {
            warn!(path = %self.dir.display(), "failed to flush partial file: {e}");
        }
        let Self { lock, file, dir, .. } = self;
        drop(file);
        if let Err(e) = lock.unlock() {
            warn!(path = %dir.display(), "failed to release download lock: {e}");
        }
    }
}

/// Reads the persisted digest manifest; absent or unparseable manifests are
/// treated as empty, which forces a fresh download.
async fn load_manifest(path: &Path) -> BTreeMap<String, String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_dir_is_a_sibling() {
        let dir = staging_dir_for(Path::new("/data/sub/file.bin"));
        assert_eq!(dir, Path::new("/data/sub/file.bin.dlstage"));
    }
}
