//! Error handling for the caravan library.
//!
//! This module provides centralized error handling with comprehensive error types
//! that can occur during download operations. All errors implement the standard
//! Error trait and provide detailed context about failures.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can happen when using caravan.
///
/// Per-asset failures are normally reported through the event stream rather
/// than through this enum; `Error` values surface where an operation is fatal
/// for the whole run (or for a caller invoking a component directly).
#[derive(Error, Debug)]
pub enum Error {
    /// A destination file already exists and the existing-file policy is `error`.
    #[error("destination already exists: {0}")]
    FileExists(PathBuf),

    /// Another process holds the staging lock for the same destination.
    ///
    /// This aborts the transfer of that single file; other assets in the run
    /// are unaffected.
    #[error("download lock is held by another process for {0}")]
    LockHeld(PathBuf),

    /// A `refresh` disposition was requested against version-control-managed
    /// immutable storage.
    #[error("refusing to refresh files under managed immutable storage: {0}")]
    ImmutableStore(PathBuf),

    /// Post-transfer digest verification failed.
    #[error("{algorithm}: downloaded {actual} != {expected}")]
    DigestMismatch {
        /// Name of the algorithm that was verified.
        algorithm: &'static str,
        /// Digest announced by the remote listing.
        expected: String,
        /// Digest computed over the transferred bytes.
        actual: String,
    },

    /// The asset listing did not carry the mandatory content-addressed digest.
    ///
    /// Fatal for that asset only; the orchestrator keeps going with the rest
    /// of the sequence.
    #[error("asset {0:?} is missing the required content-addressed digest")]
    MissingDigest(String),

    /// Error from the transport layer while listing or streaming.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A JSON record (digest manifest, metadata file) could not be
    /// serialized or deserialized.
    #[error("JSON record error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// I/O Error.
    #[error("I/O error")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Result type alias for operations that can fail with a caravan error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the byte-stream and listing collaborators.
///
/// The engine retries a bounded number of times on transient values and
/// gives up immediately on fatal ones.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The remote answered with a non-success HTTP status.
    #[error("HTTP status {code}: {message}")]
    Status {
        /// The HTTP status code.
        code: u16,
        /// Status or body text accompanying the response.
        message: String,
    },

    /// The connection failed or was interrupted mid-stream.
    #[error("network error: {0}")]
    Network(String),

    /// A non-retryable transport failure (malformed request, bad redirect, ...).
    #[error("transport error: {0}")]
    Fatal(String),
}

impl TransportError {
    /// Whether the engine should retry after this error.
    ///
    /// Transient status codes are the rate-limit/service-unavailable family
    /// plus 400, which some object stores return for requests that succeed
    /// on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Status { code, .. } => matches!(code, 400 | 429 | 503),
            TransportError::Network(_) => true,
            TransportError::Fatal(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(code) => TransportError::Status {
                code: code.as_u16(),
                message: err.to_string(),
            },
            None if err.is_builder() || err.is_request() => TransportError::Fatal(err.to_string()),
            None => TransportError::Network(err.to_string()),
        }
    }
}

impl From<reqwest_middleware::Error> for TransportError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            reqwest_middleware::Error::Middleware(e) => TransportError::Fatal(e.to_string()),
        }
    }
}
