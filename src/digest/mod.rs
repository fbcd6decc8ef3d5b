//! Digest verification for downloads.
//!
//! This module provides an explicit table of supported digest algorithms and
//! incremental hasher objects used to verify transferred bytes against the
//! digests announced by the remote listing.
//!
//! # Supported algorithms
//!
//! - **`etag`**: the size-aware, content-addressed multipart tag (see
//!   [`etag`]); this is the primary integrity and resume key.
//! - **`sha256`**: a plain cryptographic digest, used when the etag cannot be
//!   computed (unknown total size).
//!
//! # Selection
//!
//! When an asset offers several digests, exactly one is verified. The fixed
//! preference order is `etag` first, then `sha256`; the first offered
//! algorithm whose hasher can be constructed wins.
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use caravan::digest::{select, DigestAlgorithm};
//!
//! let mut offered = BTreeMap::new();
//! offered.insert(DigestAlgorithm::Sha256, "aa".repeat(32));
//! let (algorithm, _expected) = select(&offered, Some(1024)).unwrap();
//! assert_eq!(algorithm, DigestAlgorithm::Sha256);
//! ```

pub mod etag;

use crate::error::Result;
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::AsyncReadExt;

pub use etag::EtagDigester;

/// The closed set of digest algorithms caravan can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgorithm {
    /// Size-aware multipart entity tag; the content-addressed resume key.
    Etag,
    /// SHA-256 over the whole file.
    Sha256,
}

impl DigestAlgorithm {
    /// Fixed preference order applied when an asset offers several digests.
    pub const PREFERENCE: [DigestAlgorithm; 2] = [DigestAlgorithm::Etag, DigestAlgorithm::Sha256];

    /// Stable name used in digest manifests and event records.
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Etag => "etag",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }

    /// Looks an algorithm up by its stable name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "etag" => Some(DigestAlgorithm::Etag),
            "sha256" => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    /// Builds an incremental hasher, or `None` when the algorithm cannot be
    /// constructed (the etag needs a known, bounded total size).
    pub fn digester(self, total_size: Option<u64>) -> Option<Digester> {
        match self {
            DigestAlgorithm::Etag => total_size
                .and_then(EtagDigester::new)
                .map(Digester::Etag),
            DigestAlgorithm::Sha256 => Some(Digester::Sha256(Sha256::new())),
        }
    }
}

/// Incremental hasher over one of the supported algorithms.
pub enum Digester {
    /// See [`EtagDigester`].
    Etag(EtagDigester),
    /// Plain SHA-256.
    Sha256(Sha256),
}

impl Digester {
    /// Feeds a chunk of transferred bytes into the hash state.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Digester::Etag(d) => d.update(data),
            Digester::Sha256(d) => d.update(data),
        }
    }

    /// Consumes the hasher and returns the final digest as a lowercase hex
    /// string (with the `-<parts>` suffix for the etag form).
    pub fn finalize(self) -> String {
        match self {
            Digester::Etag(d) => d.finalize(),
            Digester::Sha256(d) => hex::encode(d.finalize()),
        }
    }
}

/// Picks the digest to verify from the set offered for one asset.
///
/// Returns the algorithm and its expected value, or `None` when nothing
/// offered can be verified (surfaced to consumers as `checksum: "-"`).
pub fn select(
    offered: &BTreeMap<DigestAlgorithm, String>,
    total_size: Option<u64>,
) -> Option<(DigestAlgorithm, &str)> {
    DigestAlgorithm::PREFERENCE.iter().find_map(|&algorithm| {
        let expected = offered.get(&algorithm)?;
        let constructible = match algorithm {
            DigestAlgorithm::Etag => {
                matches!(total_size, Some(size) if etag::part_size_for(size).is_some())
            }
            DigestAlgorithm::Sha256 => true,
        };
        constructible.then_some((algorithm, expected.as_str()))
    })
}

/// Feeds an existing file into `digester`, returning the number of bytes read.
///
/// Used to seed the hash state with already-staged partial bytes so a resumed
/// transfer still verifies the digest of the whole file.
pub async fn seed_from_file(digester: &mut Digester, path: &Path) -> std::io::Result<u64> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digester.update(&buf[..n]);
        total += n as u64;
    }
    Ok(total)
}

/// Computes the digest of a local file under `algorithm`.
///
/// Returns `None` when the hasher cannot be constructed for the file's size.
pub async fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> Result<Option<String>> {
    let size = tokio::fs::metadata(path).await?.len();
    let Some(mut digester) = algorithm.digester(Some(size)) else {
        return Ok(None);
    };
    seed_from_file(&mut digester, path).await?;
    Ok(Some(digester.finalize()))
}
