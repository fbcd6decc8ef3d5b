//! Builder pattern implementation for creating Downloader instances.
//!
//! # Examples
//!
//! ```rust
//! use caravan::downloader::DownloaderBuilder;
//! use caravan::transfer::ExistingFile;
//!
//! let downloader = DownloaderBuilder::new()
//!     .existing(ExistingFile::Refresh)
//!     .jobs(4)
//!     .build();
//! ```

use super::{config::DownloaderConfig, downloader::Downloader};
use crate::downloader::sync::SyncPrompt;
use crate::transfer::ExistingFile;

use std::sync::Arc;
use std::time::Duration;

/// A builder used to create a [`Downloader`].
#[derive(Debug, Default)]
pub struct DownloaderBuilder {
    config: DownloaderConfig,
}

impl DownloaderBuilder {
    /// Creates a builder with the default options.
    pub fn new() -> Self {
        DownloaderBuilder::default()
    }

    /// Sets the disposition of destination paths that already exist.
    ///
    /// The default is [`ExistingFile::Error`], which fails the whole run on
    /// the first conflict.
    pub fn existing(mut self, existing: ExistingFile) -> Self {
        self.config.existing = existing;
        self
    }

    /// Sets the number of concurrent per-asset workers.
    ///
    /// Values are clamped to at least 1. Concurrency only affects network
    /// and CPU parallelism; the per-destination filesystem lock keeps
    /// correctness independent of scheduling.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.jobs = jobs.max(1);
        self
    }

    /// Whether to materialize the dataset-level metadata file.
    pub fn get_metadata(mut self, get_metadata: bool) -> Self {
        self.config.get_metadata = get_metadata;
        self
    }

    /// Whether to download the assets themselves.
    ///
    /// With `false`, a run stops after the metadata step.
    pub fn get_assets(mut self, get_assets: bool) -> Self {
        self.config.get_assets = get_assets;
        self
    }

    /// Whether to offer deletion of local files absent from the remote after
    /// all downloads complete.
    ///
    /// Deletion also needs a [`sync_prompt`](DownloaderBuilder::sync_prompt);
    /// it is never automatic.
    pub fn sync(mut self, sync: bool) -> Self {
        self.config.sync = sync;
        self
    }

    /// Sets the collaborator consulted before the sync pass deletes anything.
    pub fn sync_prompt(mut self, prompt: Arc<dyn SyncPrompt>) -> Self {
        self.config.sync_prompt = Some(prompt);
        self
    }

    /// Sets the total attempts per asset for transient transport failures.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries.max(1);
        self
    }

    /// Sets the upper bound of the randomized sleep between attempts.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Create the [`Downloader`] with the specified options.
    pub fn build(self) -> Downloader {
        Downloader::new(self.config)
    }
}
