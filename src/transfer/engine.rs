//! Single-file download engine.
//!
//! Drives one asset through the transfer state machine:
//!
//! ```text
//! CHECK_EXISTING -> (SKIP | DOWNLOADING -> VERIFYING -> SET_MTIME -> DONE) | ERROR
//! ```
//!
//! The engine streams chunks through the digest hasher and the staging
//! append handle, retries transient transport failures within a fixed
//! attempt budget, verifies the digest before the staging file is promoted,
//! and restores the destination's modification time. Failures terminal for
//! the asset become `error` event records; only existing-file conflicts
//! under the `error` policy and immutable-store conflicts abort the whole
//! run.

use crate::digest::{self, DigestAlgorithm, Digester};
use crate::error::{Error, Result, TransportError};
use crate::progress::ProgressTotals;
use crate::remote::RemoteAsset;
use crate::staging::StagingHandle;

use super::event::{Checksum, EventRecord, EventSink, TransferStatus};
use super::existing::{immutable_store_marker, ExistingFile};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Everything the engine needs to transfer one asset.
pub struct TransferSpec<'a> {
    /// The remote asset to download.
    pub asset: &'a dyn RemoteAsset,
    /// Final destination path.
    pub target: PathBuf,
    /// Output root, checked for the immutable-store marker.
    pub toplevel: PathBuf,
    /// Digests announced for the asset, by algorithm.
    pub digests: BTreeMap<DigestAlgorithm, String>,
    /// Modification time to restore on the destination.
    pub mtime: Option<DateTime<Utc>>,
    /// Disposition of an already-existing destination.
    pub existing: ExistingFile,
    /// Total attempts for transient transport failures.
    pub retries: u32,
    /// Upper bound of the randomized sleep between attempts.
    pub retry_backoff: Duration,
}

/// Terminal result of one asset's transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The destination was written and promoted.
    Done {
        /// Result of digest verification.
        checksum: Checksum,
    },
    /// The existing-file policy kept the local file.
    Skipped {
        /// Why the transfer was skipped.
        message: String,
    },
    /// The transfer failed terminally for this asset.
    Errored {
        /// What went wrong.
        message: String,
    },
}

enum AttemptError {
    /// Worth retrying within the attempt budget.
    Transient(TransportError),
    /// Terminal for this asset.
    Fatal(String),
}

struct AttemptDone {
    handle: StagingHandle,
    digester: Option<Digester>,
    /// Whether verification applies; `false` when prior state was trusted on
    /// a pure resume-completion.
    verify: bool,
}

/// Downloads one asset to `spec.target`, emitting progress into `events`.
///
/// Returns `Err` only for conditions that abort the whole run; everything
/// terminal for just this asset is reported as an `error` event and an
/// [`TransferOutcome::Errored`] value.
pub async fn download_file(
    spec: TransferSpec<'_>,
    events: &EventSink,
    totals: &ProgressTotals,
) -> Result<TransferOutcome> {
    let TransferSpec {
        asset,
        target,
        toplevel,
        digests,
        mtime,
        existing,
        retries,
        retry_backoff,
    } = spec;
    let size = asset.size();

    // CHECK_EXISTING
    if tokio::fs::symlink_metadata(&target).await.is_ok() {
        match existing {
            ExistingFile::Error => return Err(Error::FileExists(target)),
            ExistingFile::Skip => return Ok(skip(events, "already exists")),
            ExistingFile::Overwrite => {}
            ExistingFile::OverwriteDifferent => {
                match local_matches_remote(&target, size, &digests).await {
                    Ok(true) => return Ok(skip(events, "already exists")),
                    Ok(false) => {}
                    Err(e) => {
                        debug!(path = %target.display(), "could not compare local file: {e}; redownloading");
                    }
                }
            }
            ExistingFile::Refresh => {
                let marker = immutable_store_marker(&toplevel);
                if marker.exists() {
                    return Err(Error::ImmutableStore(marker));
                }
                match mtime {
                    None => {
                        warn!(path = %target.display(), "no modification time in the record; redownloading");
                    }
                    Some(remote_mtime) => match freshness(&target, remote_mtime, size).await {
                        Ok(true) => return Ok(skip(events, "same time and size")),
                        Ok(false) => {}
                        Err(e) => return Ok(fail(events, format!("could not stat {}: {e}", target.display()))),
                    },
                }
            }
        }
    }

    if let Some(size) = size {
        events.emit(EventRecord::size(size));
    }

    if let Some(parent) = target.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return Ok(fail(events, format!("could not create {}: {e}", parent.display())));
        }
    }

    events.emit(EventRecord::status(TransferStatus::Downloading));

    let selected = digest::select(&digests, size).map(|(a, e)| (a, e.to_owned()));
    if selected.is_none() && !digests.is_empty() {
        warn!(path = %target.display(), "no usable digest among those offered; downloading without verification");
    }
    let algorithm = selected.as_ref().map(|(a, _)| *a);

    // DOWNLOADING, up to `retries` attempts on transient failures.
    let attempts = retries.max(1);
    let mut accounted = 0u64;
    let mut done = None;
    for attempt in 1..=attempts {
        match run_attempt(asset, &target, &digests, algorithm, size, &mut accounted, events, totals)
            .await
        {
            Ok(result) => {
                done = Some(result);
                break;
            }
            Err(AttemptError::Fatal(message)) => return Ok(fail(events, message)),
            Err(AttemptError::Transient(e)) => {
                if attempt == attempts {
                    return Ok(fail(events, e.to_string()));
                }
                debug!(
                    path = %target.display(),
                    "attempt {attempt} failed: {e}; sleeping before retry"
                );
                tokio::time::sleep(retry_backoff.mul_f64(rand::random::<f64>())).await;
            }
        }
    }
    let Some(AttemptDone {
        handle,
        digester,
        verify,
    }) = done
    else {
        // Unreachable: the loop either breaks with a result or returns.
        return Ok(fail(events, "download attempts exhausted".into()));
    };

    // VERIFYING
    let checksum = if !verify {
        // Resumed and already complete: trust the previously verified state.
        events.emit(EventRecord::checksum(Checksum::Absent));
        Checksum::Absent
    } else if let (Some(digester), Some((algorithm, expected))) = (digester, selected) {
        let actual = digester.finalize();
        if actual != expected {
            let message = Error::DigestMismatch {
                algorithm: algorithm.name(),
                expected,
                actual,
            }
            .to_string();
            events.emit(EventRecord::error(message.clone()).with_checksum(Checksum::Differs));
            debug!(path = %target.display(), "{message}; keeping staged data for inspection");
            handle.abort().await;
            return Ok(TransferOutcome::Errored { message });
        }
        debug!(path = %target.display(), "verified {} digest", algorithm.name());
        events.emit(EventRecord::checksum(Checksum::Ok));
        Checksum::Ok
    } else {
        events.emit(EventRecord::checksum(Checksum::Absent));
        Checksum::Absent
    };

    // SET_MTIME -> DONE
    if let Err(e) = handle.commit().await {
        return Ok(fail(events, format!("could not promote staged file: {e}")));
    }
    if let Some(mtime) = mtime {
        events.emit(EventRecord::status(TransferStatus::SettingMtime));
        let stamp = filetime::FileTime::from_unix_time(
            mtime.timestamp(),
            mtime.timestamp_subsec_nanos(),
        );
        if let Err(e) = filetime::set_file_mtime(&target, stamp) {
            warn!(path = %target.display(), "could not set modification time: {e}");
        }
    }
    events.emit(EventRecord::status(TransferStatus::Done));
    Ok(TransferOutcome::Done { checksum })
}

fn skip(events: &EventSink, message: &str) -> TransferOutcome {
    events.emit(EventRecord::skipped(message));
    TransferOutcome::Skipped {
        message: message.to_owned(),
    }
}

fn fail(events: &EventSink, message: String) -> TransferOutcome {
    events.emit(EventRecord::error(message.clone()));
    TransferOutcome::Errored { message }
}

/// One staging-open plus streaming attempt. Aborts the staging handle (and
/// keeps the partial data) on every error path.
#[allow(clippy::too_many_arguments)]
async fn run_attempt(
    asset: &dyn RemoteAsset,
    target: &Path,
    digests: &BTreeMap<DigestAlgorithm, String>,
    algorithm: Option<DigestAlgorithm>,
    size: Option<u64>,
    accounted: &mut u64,
    events: &EventSink,
    totals: &ProgressTotals,
) -> std::result::Result<AttemptDone, AttemptError> {
    let mut handle = StagingHandle::open(target, digests)
        .await
        .map_err(|e| AttemptError::Fatal(e.to_string()))?;
    match attempt_body(&mut handle, asset, algorithm, size, accounted, events, totals).await {
        Ok((digester, verify)) => Ok(AttemptDone {
            handle,
            digester,
            verify,
        }),
        Err(e) => {
            handle.abort().await;
            Err(e)
        }
    }
}

async fn attempt_body(
    handle: &mut StagingHandle,
    asset: &dyn RemoteAsset,
    algorithm: Option<DigestAlgorithm>,
    size: Option<u64>,
    accounted: &mut u64,
    events: &EventSink,
    totals: &ProgressTotals,
) -> std::result::Result<(Option<Digester>, bool), AttemptError> {
    let offset = handle.offset();
    if offset > *accounted {
        totals.add_done(offset - *accounted);
        *accounted = offset;
    }

    if size == Some(offset) {
        if offset > 0 {
            // Already fully downloaded; a range request for the remaining
            // zero bytes would be rejected by the server.
            debug!(path = %handle.partial_path().display(), "partial file already complete");
            return Ok((None, false));
        }
        // Empty asset: nothing to stream, but the (empty) digest still applies.
        return Ok((algorithm.and_then(|a| a.digester(size)), true));
    }

    let mut digester = algorithm.and_then(|a| a.digester(size));
    if offset > 0 {
        if let Some(d) = digester.as_mut() {
            // Resumed transfers verify the digest of the whole file, so the
            // already-staged bytes are hashed before streaming continues.
            digest::seed_from_file(d, &handle.partial_path())
                .await
                .map_err(|e| AttemptError::Fatal(format!("could not hash partial file: {e}")))?;
        }
    }

    let mut stream = asset.download_stream(offset);
    let mut downloaded = offset;
    let mut warned_oversize = false;
    while let Some(item) = stream.next().await {
        let chunk = item.map_err(|e| {
            if e.is_transient() {
                AttemptError::Transient(e)
            } else {
                AttemptError::Fatal(e.to_string())
            }
        })?;
        if let Some(d) = digester.as_mut() {
            d.update(&chunk);
        }
        handle
            .append(&chunk)
            .await
            .map_err(|e| AttemptError::Fatal(e.to_string()))?;
        downloaded += chunk.len() as u64;
        *accounted += chunk.len() as u64;
        totals.add_done(chunk.len() as u64);

        let percent = size.map(|s| {
            if s > 0 {
                downloaded as f64 * 100.0 / s as f64
            } else {
                100.0
            }
        });
        if let Some(s) = size {
            if downloaded > s && !warned_oversize {
                warned_oversize = true;
                warn!(
                    path = %handle.partial_path().display(),
                    "received {downloaded} bytes although the declared size is {s}"
                );
            }
        }
        events.emit(EventRecord::progress(downloaded, percent));
    }
    Ok((digester, true))
}

/// `overwrite-different`: does the local file match the remote's size and
/// content-addressed digest?
async fn local_matches_remote(
    target: &Path,
    size: Option<u64>,
    digests: &BTreeMap<DigestAlgorithm, String>,
) -> Result<bool> {
    let meta = tokio::fs::metadata(target).await?;
    if let Some(size) = size {
        if meta.len() != size {
            debug!(path = %target.display(), "size differs from the remote; redownloading");
            return Ok(false);
        }
    }
    for algorithm in DigestAlgorithm::PREFERENCE {
        let Some(expected) = digests.get(&algorithm) else {
            continue;
        };
        let Some(actual) = digest::digest_file(target, algorithm).await? else {
            continue;
        };
        return Ok(actual == *expected);
    }
    Ok(false)
}

/// `refresh`: do the local mtime and size both match the asset record?
async fn freshness(
    target: &Path,
    remote_mtime: DateTime<Utc>,
    size: Option<u64>,
) -> std::io::Result<bool> {
    let meta = tokio::fs::metadata(target).await?;
    let same_mtime = meta
        .modified()
        .map(|local| DateTime::<Utc>::from(local).timestamp() == remote_mtime.timestamp())
        .unwrap_or(false);
    let same_size = size.is_some_and(|s| s == meta.len());
    if !(same_mtime && same_size) {
        debug!(
            path = %target.display(),
            same_mtime, same_size, "attributes differ; redownloading"
        );
    }
    Ok(same_mtime && same_size)
}
