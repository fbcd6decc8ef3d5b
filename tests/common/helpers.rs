//! Shared fixtures: in-memory implementations of the remote collaborator
//! traits with scriptable failure injection, plus event-collection helpers.

use async_trait::async_trait;
use bytes::Bytes;
use caravan::digest::DigestAlgorithm;
use caravan::error::TransportError;
use caravan::progress::ProgressTotals;
use caravan::remote::{
    ByteStream, DatasetRecord, Navigation, RemoteAsset, RemoteRepository,
};
use caravan::transfer::{
    download_file, EventRecord, EventSink, ExistingFile, TransferOutcome, TransferSpec,
    TransferStatus,
};
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Creates a temporary directory for testing purposes.
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Creates test file content of specified size.
pub fn create_test_content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// A fixed, timezone-stable asset timestamp.
pub fn test_mtime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 5, 17, 10, 30, 0).unwrap()
}

/// How one call to `download_stream` behaves.
#[derive(Debug, Clone, Copy)]
pub enum StreamPlan {
    /// Stream every remaining byte.
    Complete,
    /// Stream `0` bytes, then fail with the given HTTP status.
    TransientAfter(usize, u16),
    /// Stream some bytes, then fail fatally.
    FatalAfter(usize),
}

/// In-memory [`RemoteAsset`] with self-consistent digests and scriptable
/// per-call stream failures.
pub struct MockAsset {
    path: String,
    size: Option<u64>,
    modified: Option<DateTime<Utc>>,
    content: Vec<u8>,
    digests: serde_json::Value,
    chunk_size: usize,
    plans: Mutex<VecDeque<StreamPlan>>,
    starts: Mutex<Vec<u64>>,
}

impl MockAsset {
    /// An asset whose announced digests match `content`.
    pub fn new(path: &str, content: &[u8]) -> Self {
        let mut etag = DigestAlgorithm::Etag
            .digester(Some(content.len() as u64))
            .unwrap();
        etag.update(content);
        let mut sha = DigestAlgorithm::Sha256.digester(None).unwrap();
        sha.update(content);
        Self {
            path: path.to_owned(),
            size: Some(content.len() as u64),
            modified: Some(test_mtime()),
            content: content.to_vec(),
            digests: json!({
                "etag": etag.finalize(),
                "sha256": sha.finalize(),
            }),
            chunk_size: 4,
            plans: Mutex::new(VecDeque::new()),
            starts: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the announced digest mapping.
    pub fn with_digests(mut self, digests: serde_json::Value) -> Self {
        self.digests = digests;
        self
    }

    /// Pretends the listing does not know the size.
    pub fn with_unknown_size(mut self) -> Self {
        self.size = None;
        self
    }

    /// Drops the modification timestamp.
    pub fn without_mtime(mut self) -> Self {
        self.modified = None;
        self
    }

    /// Scripts the behavior of successive `download_stream` calls; calls
    /// beyond the script stream to completion.
    pub fn with_plans(self, plans: Vec<StreamPlan>) -> Self {
        *self.plans.lock().unwrap() = plans.into();
        self
    }

    /// Offsets `download_stream` has been called with, in order.
    pub fn stream_starts(&self) -> Vec<u64> {
        self.starts.lock().unwrap().clone()
    }

    /// The digests this asset announces, keyed by algorithm.
    pub fn digest_map(&self) -> BTreeMap<DigestAlgorithm, String> {
        self.digests
            .as_object()
            .into_iter()
            .flatten()
            .filter_map(|(name, value)| {
                Some((DigestAlgorithm::from_name(name)?, value.as_str()?.to_owned()))
            })
            .collect()
    }

    /// The content bytes this asset serves.
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

#[async_trait]
impl RemoteAsset for MockAsset {
    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    async fn raw_metadata(&self) -> Result<serde_json::Value, TransportError> {
        let mut metadata = json!({ "digest": self.digests });
        if let Some(modified) = self.modified {
            metadata["blobDateModified"] = json!(modified.to_rfc3339());
        }
        Ok(metadata)
    }

    fn download_stream(&self, start: u64) -> ByteStream {
        self.starts.lock().unwrap().push(start);
        let plan = self
            .plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StreamPlan::Complete);
        let remaining: Vec<u8> = self.content[start as usize..].to_vec();
        let (limit, failure) = match plan {
            StreamPlan::Complete => (remaining.len(), None),
            StreamPlan::TransientAfter(bytes, code) => (
                bytes,
                Some(TransportError::Status {
                    code,
                    message: "scripted failure".into(),
                }),
            ),
            StreamPlan::FatalAfter(bytes) => {
                (bytes, Some(TransportError::Fatal("scripted failure".into())))
            }
        };
        let mut items: Vec<Result<Bytes, TransportError>> = remaining
            [..limit.min(remaining.len())]
            .chunks(self.chunk_size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if let Some(failure) = failure {
            items.push(Err(failure));
        }
        stream::iter(items).boxed()
    }
}

/// Delegating wrapper so one [`MockAsset`] can be handed out as a boxed
/// trait object while the test keeps its own reference.
pub struct SharedAsset(pub Arc<MockAsset>);

#[async_trait]
impl RemoteAsset for SharedAsset {
    fn path(&self) -> &str {
        self.0.path()
    }

    fn size(&self) -> Option<u64> {
        self.0.size()
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        self.0.modified()
    }

    async fn raw_metadata(&self) -> Result<serde_json::Value, TransportError> {
        self.0.raw_metadata().await
    }

    fn download_stream(&self, start: u64) -> ByteStream {
        self.0.download_stream(start)
    }
}

/// In-memory [`RemoteRepository`].
pub struct MockRepository {
    pub dataset: Option<DatasetRecord>,
    pub assets: Vec<Arc<MockAsset>>,
}

impl MockRepository {
    pub fn new(assets: Vec<Arc<MockAsset>>) -> Self {
        Self {
            dataset: None,
            assets,
        }
    }

    pub fn with_dataset(mut self, raw: serde_json::Value) -> Self {
        self.dataset = Some(DatasetRecord {
            raw,
            modified: Some(test_mtime()),
        });
        self
    }
}

#[async_trait]
impl RemoteRepository for MockRepository {
    async fn navigate(&self) -> Result<Navigation, TransportError> {
        let assets: Vec<_> = self.assets.iter().map(Arc::clone).collect();
        Ok(Navigation {
            dataset: self.dataset.clone(),
            assets: stream::iter(
                assets
                    .into_iter()
                    .map(|asset| Ok(Box::new(SharedAsset(asset)) as Box<dyn RemoteAsset>)),
            )
            .boxed(),
        })
    }
}

/// A transfer spec wired to the asset's own digests, with instant retries.
pub fn spec_for<'a>(asset: &'a MockAsset, target: &Path, toplevel: &Path) -> TransferSpec<'a> {
    TransferSpec {
        asset,
        target: target.to_path_buf(),
        toplevel: toplevel.to_path_buf(),
        digests: asset.digest_map(),
        mtime: asset.modified(),
        existing: ExistingFile::Error,
        retries: 3,
        retry_backoff: Duration::ZERO,
    }
}

/// Runs the engine and collects the emitted records.
pub async fn run_engine(
    spec: TransferSpec<'_>,
) -> (caravan::Result<TransferOutcome>, Vec<EventRecord>) {
    let (sink, mut rx) = EventSink::channel();
    let totals = ProgressTotals::default();
    let result = download_file(spec, &sink, &totals).await;
    drop(sink);
    let mut events = Vec::new();
    while let Ok(record) = rx.try_recv() {
        events.push(record);
    }
    (result, events)
}

/// The statuses present in `events`, in order.
pub fn statuses(events: &[EventRecord]) -> Vec<TransferStatus> {
    events.iter().filter_map(|record| record.status).collect()
}

/// Paths of all files below `dir`, relative, slash-joined, sorted.
pub fn files_under(dir: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                let rel = path.strip_prefix(root).unwrap();
                out.push(
                    rel.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/"),
                );
            }
        }
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}

/// Sync prompt driven by a scripted list of choices, recording the
/// candidate lists it was shown.
pub struct ScriptedPrompt {
    choices: Mutex<VecDeque<caravan::SyncChoice>>,
    pub seen: Mutex<Vec<Vec<PathBuf>>>,
}

impl ScriptedPrompt {
    pub fn new(choices: Vec<caravan::SyncChoice>) -> Self {
        Self {
            choices: Mutex::new(choices.into()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl caravan::SyncPrompt for ScriptedPrompt {
    fn choose(&self, candidates: &[PathBuf]) -> caravan::SyncChoice {
        self.seen.lock().unwrap().push(candidates.to_vec());
        self.choices
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(caravan::SyncChoice::Keep)
    }

    fn show(&self, _candidates: &[PathBuf]) {}
}
