//! Core downloader implementation with orchestration logic.
//!
//! The [`Downloader`] walks a remote repository's lazy asset sequence,
//! resolves each asset's destination under the selection shape, and hands
//! every asset to the single-file engine, optionally fanned out across
//! several workers. It produces a [`DownloadHandle`]: a stream of
//! [`EventRecord`]s multiplexed from all in-flight transfers plus the
//! run-level outcome.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use caravan::downloader::DownloaderBuilder;
//! use caravan::remote::{RemoteRepository, Selection};
//!
//! # async fn example(repository: Arc<dyn RemoteRepository>) -> caravan::Result<()> {
//! let downloader = DownloaderBuilder::new().jobs(4).build();
//! let mut handle = downloader.download(repository, Selection::Dataset, "out");
//! while let Some(record) = handle.next().await {
//!     println!("{}", serde_json::to_string(&record).unwrap());
//! }
//! handle.join().await?;
//! # Ok(())
//! # }
//! ```

use super::config::DownloaderConfig;
use super::metadata::populate_dataset_metadata;
use super::sync::sync_local_tree;
use crate::digest::DigestAlgorithm;
use crate::error::{Error, Result, TransportError};
use crate::progress::ProgressTotals;
use crate::remote::{Navigation, RemoteAsset, RemoteRepository, Selection};
use crate::transfer::{download_file, EventRecord, EventSink, TransferSpec};
use crate::utils::paths;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

/// Represents the download controller.
///
/// A downloader is created via its builder:
///
/// ```rust
/// use caravan::downloader::DownloaderBuilder;
///
/// let d = DownloaderBuilder::new().build();
/// ```
#[derive(Clone)]
pub struct Downloader {
    config: DownloaderConfig,
}

impl fmt::Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .finish()
    }
}

impl Downloader {
    /// Creates a new Downloader with the given configuration.
    pub(crate) fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    /// Gets the configured existing-file policy.
    pub fn existing(&self) -> crate::transfer::ExistingFile {
        self.config.existing
    }

    /// Gets the number of concurrent per-asset workers.
    pub fn jobs(&self) -> usize {
        self.config.jobs
    }

    /// Gets whether the dataset metadata file is materialized.
    pub fn get_metadata(&self) -> bool {
        self.config.get_metadata
    }

    /// Gets whether assets are downloaded.
    pub fn get_assets(&self) -> bool {
        self.config.get_assets
    }

    /// Gets whether the sync pass runs after downloads.
    pub fn sync(&self) -> bool {
        self.config.sync
    }

    /// Gets the number of attempts per asset.
    pub fn retries(&self) -> u32 {
        self.config.retries
    }

    /// Starts a download run.
    ///
    /// Returns immediately with a [`DownloadHandle`]; the run itself is
    /// driven by a spawned task and progresses while the handle's event
    /// stream is consumed (or ignored).
    pub fn download(
        &self,
        repository: Arc<dyn RemoteRepository>,
        selection: Selection,
        output_root: impl Into<PathBuf>,
    ) -> DownloadHandle {
        let (events, rx) = EventSink::channel();
        let totals = Arc::new(ProgressTotals::default());
        let config = self.config.clone();
        let output_root = output_root.into();
        let driver_totals = Arc::clone(&totals);
        let driver = tokio::spawn(async move {
            drive(config, repository, selection, output_root, events, driver_totals).await
        });
        DownloadHandle {
            events: UnboundedReceiverStream::new(rx),
            totals,
            driver,
        }
    }
}

/// A running download: the multiplexed event stream plus the run outcome.
///
/// Implements [`Stream`] over [`EventRecord`]s; the stream ends when the run
/// is finished. Dropping the handle cancels the run; in-flight assets are
/// left safely resumable by the staging protocol.
pub struct DownloadHandle {
    events: UnboundedReceiverStream<EventRecord>,
    totals: Arc<ProgressTotals>,
    driver: tokio::task::JoinHandle<Result<()>>,
}

impl DownloadHandle {
    /// Shared aggregate counters, safe to read while the run progresses.
    pub fn totals(&self) -> Arc<ProgressTotals> {
        Arc::clone(&self.totals)
    }

    /// Waits for the run to finish and returns its outcome.
    ///
    /// Per-asset failures are reported through the event stream, not here;
    /// `Err` means the run as a whole was aborted (existing-file conflict
    /// under the `error` policy, immutable-store conflict, listing failure).
    pub async fn join(self) -> Result<()> {
        match self.driver.await {
            Ok(result) => result,
            Err(e) => Err(Error::Io {
                source: std::io::Error::other(e),
            }),
        }
    }
}

impl Stream for DownloadHandle {
    type Item = EventRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

async fn drive(
    config: DownloaderConfig,
    repository: Arc<dyn RemoteRepository>,
    selection: Selection,
    output_root: PathBuf,
    events: EventSink,
    totals: Arc<ProgressTotals>,
) -> Result<()> {
    let Navigation { dataset, assets } = repository.navigate().await?;

    if selection == Selection::Dataset && config.get_metadata {
        if let Some(dataset) = &dataset {
            populate_dataset_metadata(&output_root, dataset, config.existing, &events).await?;
        }
    }

    if !config.get_assets {
        return Ok(());
    }

    {
        let jobs = config.jobs.max(1);
        let mut in_flight = assets
            .map(|item| {
                process_asset_owned(
                    item,
                    config.clone(),
                    selection.clone(),
                    output_root.clone(),
                    events.clone(),
                    Arc::clone(&totals),
                )
            })
            .buffer_unordered(jobs);
        while let Some(result) = in_flight.next().await {
            result?;
        }
    }

    if config.sync {
        sync_local_tree(
            repository.as_ref(),
            &selection,
            &output_root,
            config.sync_prompt.as_deref(),
        )
        .await?;
    }
    Ok(())
}

/// Prepares one asset (digests, mtime, destination) and runs the engine.
///
/// Failures scoped to the asset become `error` events; only run-fatal
/// conditions propagate as `Err`.
async fn process_asset(
    item: std::result::Result<Box<dyn RemoteAsset>, TransportError>,
    config: &DownloaderConfig,
    selection: &Selection,
    output_root: &Path,
    events: &EventSink,
    totals: &ProgressTotals,
) -> Result<()> {
    // A failure of the listing itself aborts the run.
    let asset = item.map_err(Error::from)?;
    let rel = selection.resolve(asset.path());
    let label = paths::to_posix(&rel);
    let events = events.scoped(&label);
    totals.record_asset(asset.size());

    let metadata = match asset.raw_metadata().await {
        Ok(metadata) => metadata,
        Err(e) => {
            events.emit(EventRecord::error(format!(
                "could not fetch asset metadata: {e}"
            )));
            return Ok(());
        }
    };

    let mut digests = BTreeMap::new();
    if let Some(offered) = metadata.get("digest").and_then(|v| v.as_object()) {
        for (name, value) in offered {
            if let (Some(algorithm), Some(digest)) =
                (DigestAlgorithm::from_name(name), value.as_str())
            {
                digests.insert(algorithm, digest.to_owned());
            }
        }
    }
    if !digests.contains_key(&DigestAlgorithm::Etag) {
        events.emit(EventRecord::error(
            Error::MissingDigest(asset.path().to_owned()).to_string(),
        ));
        return Ok(());
    }

    let mtime = resolve_mtime(&metadata, asset.as_ref());

    let spec = TransferSpec {
        asset: asset.as_ref(),
        target: output_root.join(&rel),
        toplevel: output_root.to_path_buf(),
        digests,
        mtime,
        existing: config.existing,
        retries: config.retries,
        retry_backoff: config.retry_backoff,
    };
    download_file(spec, &events, totals).await.map(|_| ())
}

/// The content's own timestamp when the metadata has one, falling back to
/// the asset record's.
fn resolve_mtime(
    metadata: &serde_json::Value,
    asset: &dyn RemoteAsset,
) -> Option<DateTime<Utc>> {
    match metadata.get("blobDateModified").and_then(|v| v.as_str()) {
        Some(value) => match DateTime::parse_from_rfc3339(value) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(e) => {
                warn!(path = asset.path(), "unparseable blobDateModified: {e}");
                asset.modified()
            }
        },
        None => {
            warn!(
                path = asset.path(),
                "asset is missing the blobDateModified metadata field"
            );
            asset.modified()
        }
    }
}
