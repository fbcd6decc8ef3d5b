//! Progress event records.
//!
//! Transfers report what they are doing through an append-only sequence of
//! [`EventRecord`]s: partial mappings over the fields `path`, `size`, `done`,
//! `done%`, `checksum`, `status` and `message`. Records for one asset arrive
//! in order; records of different assets interleave arbitrarily. Consumers
//! may render them as a live table, log them, or drop them.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of the digest verification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Checksum {
    /// Computed digest matches the expected digest.
    #[serde(rename = "ok")]
    Ok,
    /// Computed digest differs from the expected digest.
    #[serde(rename = "differs")]
    Differs,
    /// No verification was performed (no usable digest, or prior state was
    /// trusted on a pure resume).
    #[serde(rename = "-")]
    Absent,
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Checksum::Ok => "ok",
            Checksum::Differs => "differs",
            Checksum::Absent => "-",
        };
        f.write_str(s)
    }
}

/// Coarse transfer state carried in the `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferStatus {
    /// Bytes are being streamed.
    #[serde(rename = "downloading")]
    Downloading,
    /// Restoring the destination's modification time.
    #[serde(rename = "setting mtime")]
    SettingMtime,
    /// Transfer finished successfully.
    #[serde(rename = "done")]
    Done,
    /// Transfer was skipped by the existing-file policy.
    #[serde(rename = "skipped")]
    Skipped,
    /// Transfer failed terminally.
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStatus::Downloading => "downloading",
            TransferStatus::SettingMtime => "setting mtime",
            TransferStatus::Done => "done",
            TransferStatus::Skipped => "skipped",
            TransferStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One progress record; unset fields are omitted when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventRecord {
    /// Destination path the record belongs to, relative to the output root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Total size in bytes, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Bytes present so far (including resumed bytes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<u64>,
    /// Percentage of `size` present so far.
    #[serde(rename = "done%", skip_serializing_if = "Option::is_none")]
    pub done_percent: Option<f64>,
    /// Digest verification result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    /// Coarse transfer state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TransferStatus>,
    /// Human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EventRecord {
    /// Record announcing the total size.
    pub fn size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    /// Record reporting transfer progress.
    pub fn progress(done: u64, percent: Option<f64>) -> Self {
        Self {
            done: Some(done),
            done_percent: percent,
            ..Self::default()
        }
    }

    /// Record carrying only a status.
    pub fn status(status: TransferStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Record carrying only a checksum outcome.
    pub fn checksum(checksum: Checksum) -> Self {
        Self {
            checksum: Some(checksum),
            ..Self::default()
        }
    }

    /// Record carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Terminal skip record.
    pub fn skipped(message: impl Into<String>) -> Self {
        Self::status(TransferStatus::Skipped).with_message(message)
    }

    /// Terminal error record.
    pub fn error(message: impl Into<String>) -> Self {
        Self::status(TransferStatus::Error).with_message(message)
    }

    /// Attaches a checksum outcome.
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Attaches a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches a path tag.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Sending side of the event stream.
///
/// Cloneable and cheap; a sink scoped with [`scoped`](EventSink::scoped)
/// tags every record it emits with the asset path so a multiplexed consumer
/// can attribute progress. Emission never blocks and never fails: once the
/// consumer goes away, records are silently discarded.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EventRecord>,
    path: Option<Arc<str>>,
}

impl EventSink {
    /// Creates a sink and the receiver its records are delivered to.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, path: None }, rx)
    }

    /// A sink whose records are tagged with `path`.
    pub fn scoped(&self, path: &str) -> Self {
        Self {
            tx: self.tx.clone(),
            path: Some(Arc::from(path)),
        }
    }

    /// Emits one record.
    pub fn emit(&self, mut record: EventRecord) {
        if record.path.is_none() {
            record.path = self.path.as_deref().map(String::from);
        }
        let _ = self.tx.send(record);
    }
}
