//! Configuration structures and defaults for the downloader.

use crate::downloader::sync::SyncPrompt;
use crate::transfer::ExistingFile;

use std::sync::Arc;
use std::time::Duration;

/// Configuration structure for the downloader.
#[derive(Clone)]
pub struct DownloaderConfig {
    /// Disposition of destination paths that already exist.
    pub existing: ExistingFile,
    /// Number of concurrent per-asset workers.
    pub jobs: usize,
    /// Materialize the dataset-level metadata file.
    pub get_metadata: bool,
    /// Download the assets themselves.
    pub get_assets: bool,
    /// Run the interactive cleanup pass after all downloads complete.
    pub sync: bool,
    /// Collaborator deciding what the sync pass may delete.
    pub sync_prompt: Option<Arc<dyn SyncPrompt>>,
    /// Total attempts per asset for transient transport failures.
    pub retries: u32,
    /// Upper bound of the randomized sleep between attempts.
    pub retry_backoff: Duration,
}

impl std::fmt::Debug for DownloaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloaderConfig")
            .field("existing", &self.existing)
            .field("jobs", &self.jobs)
            .field("get_metadata", &self.get_metadata)
            .field("get_assets", &self.get_assets)
            .field("sync", &self.sync)
            .field("sync_prompt", &self.sync_prompt.is_some())
            .field("retries", &self.retries)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            existing: ExistingFile::Error,
            jobs: 1,
            get_metadata: true,
            get_assets: true,
            sync: false,
            sync_prompt: None,
            retries: 3,
            retry_backoff: Duration::from_secs(5),
        }
    }
}
