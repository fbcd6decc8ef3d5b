//! Caravan is a crate for resumable, integrity-verified bulk file downloads.
//!
//! Given a navigable remote archive (anything implementing the
//! [`remote::RemoteRepository`] and [`remote::RemoteAsset`] traits), it
//! fetches the selected assets into a local directory tree, staging partial
//! data in sidecar directories so interrupted transfers resume without
//! re-transferring received bytes, verifying content digests after transfer,
//! and holding a cross-process lock so two processes never corrupt the same
//! destination.
//!
//! # Quick Start
//!
//! ```rust
//! use caravan::downloader::DownloaderBuilder;
//! use caravan::transfer::ExistingFile;
//!
//! let downloader = DownloaderBuilder::new()
//!     .existing(ExistingFile::Skip)
//!     .jobs(4)
//!     .build();
//! ```
//!
//! Calling [`Downloader::download`] with a repository, a
//! [`remote::Selection`] and an output root returns a
//! [`downloader::DownloadHandle`]: a stream of [`transfer::EventRecord`]s,
//! partial mappings over `{path, size, done, done%, checksum, status,
//! message}`, that a consumer can render as a live table, log, or discard,
//! plus the run-level outcome via `join()`.
//!
//! # Module Organization
//!
//! - [`digest`] - The enumerated digest table and the size-aware
//!   content-addressed tag used for verification and resume identity
//! - [`staging`] - The on-disk resumable-download protocol: sidecar staging
//!   directories, digest manifests, locks, and atomic promotion
//! - [`transfer`] - The single-file download engine, its event records and
//!   the existing-file policy
//! - [`downloader`] - The orchestrator, its builder and configuration, the
//!   dataset metadata step, and the sync pass
//! - [`remote`] - Traits through which the remote archive is consumed
//! - [`http`] - Client construction and ranged chunk streams for HTTP-backed
//!   trait implementations
//! - [`progress`] - Aggregate counters shared with a presentation layer
//! - [`error`] - Centralized error handling with the `Error` enum

pub mod digest;
pub mod downloader;
pub mod error;
pub mod http;
pub mod progress;
pub mod remote;
pub mod staging;
pub mod transfer;
pub mod utils;

pub use digest::{DigestAlgorithm, Digester};
pub use downloader::{
    DownloadHandle, Downloader, DownloaderBuilder, SyncChoice, SyncPrompt, DATASET_METADATA_FILE,
};
pub use error::{Error, Result, TransportError};
pub use http::{create_http_client, HttpClientConfig};
pub use progress::{ProgressSnapshot, ProgressTotals};
pub use remote::{
    AssetStream, ByteStream, DatasetRecord, Navigation, RemoteAsset, RemoteRepository, Selection,
};
pub use staging::{StagingHandle, STAGING_SUFFIX};
pub use transfer::{
    download_file, Checksum, EventRecord, EventSink, ExistingFile, TransferOutcome, TransferSpec,
    TransferStatus,
};
