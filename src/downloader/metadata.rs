//! Dataset-level metadata file.
//!
//! Whole-dataset runs materialize one metadata file at the output root so a
//! local tree carries the dataset record it was downloaded from. The file is
//! refreshed under a subset of the existing-file policies: `error`, `skip`
//! and mtime-based `refresh` apply; the content-comparing policies do not,
//! since there is no per-file digest for the record.

use crate::error::{Error, Result};
use crate::remote::DatasetRecord;
use crate::transfer::existing::immutable_store_marker;
use crate::transfer::{EventRecord, EventSink, ExistingFile, TransferStatus};

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, warn};

/// Fixed name of the dataset-level metadata file at the output root.
pub const DATASET_METADATA_FILE: &str = "dataset.json";

/// Writes or updates the dataset metadata file, emitting progress records
/// tagged with [`DATASET_METADATA_FILE`].
pub(crate) async fn populate_dataset_metadata(
    output_root: &Path,
    dataset: &DatasetRecord,
    existing: ExistingFile,
    events: &EventSink,
) -> Result<()> {
    let raw = &dataset.raw;
    let empty = raw.as_object().map_or(true, |m| m.is_empty());
    if empty {
        warn!("got an empty dataset metadata record; not producing {DATASET_METADATA_FILE}");
        return Ok(());
    }

    let path = output_root.join(DATASET_METADATA_FILE);
    let events = events.scoped(DATASET_METADATA_FILE);
    events.emit(EventRecord::message("updating"));
    debug!(path = %path.display(), "updating from the obtained dataset metadata");

    if tokio::fs::symlink_metadata(&path).await.is_ok() {
        match existing {
            ExistingFile::Error => return Err(Error::FileExists(path)),
            ExistingFile::Skip => {
                events.emit(EventRecord::skipped("already exists"));
                return Ok(());
            }
            ExistingFile::Refresh => {
                let marker = immutable_store_marker(output_root);
                if marker.exists() {
                    return Err(Error::ImmutableStore(marker));
                }
                if let Some(remote) = dataset.modified {
                    if local_is_fresh(&path, remote).await {
                        events.emit(EventRecord::skipped("already exists"));
                        return Ok(());
                    }
                }
            }
            // No per-file digest to compare against; rewrite.
            ExistingFile::Overwrite | ExistingFile::OverwriteDifferent => {}
        }
    }

    tokio::fs::create_dir_all(output_root).await?;
    let old: Option<serde_json::Value> = match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).ok(),
        Err(_) => None,
    };

    let mut body = serde_json::to_vec_pretty(raw)?;
    body.push(b'\n');
    tokio::fs::write(&path, body).await?;

    if let Some(mtime) = dataset.modified {
        let stamp =
            filetime::FileTime::from_unix_time(mtime.timestamp(), mtime.timestamp_subsec_nanos());
        if let Err(e) = filetime::set_file_mtime(&path, stamp) {
            warn!(path = %path.display(), "could not set modification time: {e}");
        }
    }

    let message = if old.as_ref() == Some(raw) {
        "same"
    } else {
        "updated"
    };
    events.emit(EventRecord::status(TransferStatus::Done).with_message(message));
    Ok(())
}

async fn local_is_fresh(path: &Path, remote: DateTime<Utc>) -> bool {
    match tokio::fs::symlink_metadata(path).await.and_then(|m| m.modified()) {
        Ok(local) => DateTime::<Utc>::from(local).timestamp() >= remote.timestamp(),
        Err(_) => false,
    }
}
