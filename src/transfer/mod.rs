//! Per-asset transfer machinery.
//!
//! This module contains the single-file download engine and its supporting
//! types: the [`EventRecord`] progress records it emits, the
//! [`ExistingFile`] disposition policy, and the [`TransferOutcome`] terminal
//! record.

pub mod engine;
pub mod event;
pub mod existing;

pub use engine::{download_file, TransferOutcome, TransferSpec};
pub use event::{Checksum, EventRecord, EventSink, TransferStatus};
pub use existing::ExistingFile;
