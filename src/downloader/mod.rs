//! Download orchestration.
//!
//! This module contains the [`Downloader`], its [`DownloaderBuilder`], the
//! run configuration, the dataset metadata step, and the interactive sync
//! pass.

pub mod builder;
pub mod config;
pub mod downloader;
pub mod metadata;
pub mod sync;

pub use builder::DownloaderBuilder;
pub use config::DownloaderConfig;
pub use downloader::{DownloadHandle, Downloader};
pub use metadata::DATASET_METADATA_FILE;
pub use sync::{SyncChoice, SyncPrompt};
