//! Interactive cleanup of local files absent from the remote.
//!
//! After a run completes, the sync pass re-lists the remote assets, walks the
//! local download directory, and collects every local file whose
//! archive-relative path no longer exists remotely. Deletion is destructive
//! and therefore never automatic: a [`SyncPrompt`] collaborator decides
//! whether the candidates are listed, deleted, or kept.

use crate::downloader::metadata::DATASET_METADATA_FILE;
use crate::error::Result;
use crate::remote::{Navigation, RemoteRepository, Selection};
use crate::staging::STAGING_SUFFIX;
use crate::utils::paths;

use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What the prompt decided to do with the deletion candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncChoice {
    /// Delete every candidate.
    Delete,
    /// Keep everything.
    Keep,
    /// Show the candidates, then ask again.
    List,
}

/// Collaborator consulted before the sync pass deletes local files.
pub trait SyncPrompt: Send + Sync {
    /// Decides the fate of `candidates`. Asked again after [`SyncChoice::List`].
    fn choose(&self, candidates: &[PathBuf]) -> SyncChoice;

    /// Renders the candidate list; the default prints one path per line.
    fn show(&self, candidates: &[PathBuf]) {
        for path in candidates {
            println!("{}", path.display());
        }
    }
}

pub(crate) async fn sync_local_tree(
    repository: &dyn RemoteRepository,
    selection: &Selection,
    output_root: &Path,
    prompt: Option<&dyn SyncPrompt>,
) -> Result<()> {
    let Some((prefix, download_dir)) = selection.sync_layout(output_root) else {
        debug!("single-file selections are never synced");
        return Ok(());
    };

    let Navigation { mut assets, .. } = repository.navigate().await?;
    let mut remote_paths = HashSet::new();
    while let Some(asset) = assets.next().await {
        remote_paths.insert(paths::segments(asset?.path()).join("/"));
    }

    let mut local = Vec::new();
    collect_files(&download_dir, &mut local)?;
    local.sort();

    let metadata_file = output_root.join(DATASET_METADATA_FILE);
    let mut candidates = Vec::new();
    for file in local {
        if file == metadata_file {
            continue;
        }
        let Ok(rel) = file.strip_prefix(&download_dir) else {
            continue;
        };
        let remote_path = prefix
            .iter()
            .cloned()
            .chain(
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned()),
            )
            .collect::<Vec<_>>()
            .join("/");
        if !remote_paths.contains(&remote_path) {
            candidates.push(file);
        }
    }
    if candidates.is_empty() {
        return Ok(());
    }

    let Some(prompt) = prompt else {
        warn!(
            "{} local files have no remote counterpart, but no sync prompt is configured; keeping them",
            candidates.len()
        );
        return Ok(());
    };
    loop {
        match prompt.choose(&candidates) {
            SyncChoice::List => prompt.show(&candidates),
            SyncChoice::Delete => {
                for path in &candidates {
                    tokio::fs::remove_file(path).await?;
                }
                break;
            }
            SyncChoice::Keep => break,
        }
    }
    Ok(())
}

/// Walks `dir` recursively, skipping VCS directories and in-flight staging
/// directories.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let staging_suffix = format!(".{STAGING_SUFFIX}");
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if name == ".git" || name.ends_with(&staging_suffix) {
                continue;
            }
            collect_files(&entry.path(), out)?;
        } else {
            out.push(entry.path());
        }
    }
    Ok(())
}
