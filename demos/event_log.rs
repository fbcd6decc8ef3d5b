//! Downloads a small in-memory dataset and prints every event record as a
//! JSON line, the way a line-oriented debug consumer would.
//!
//! Run with: `cargo run --example event_log`

use async_trait::async_trait;
use bytes::Bytes;
use caravan::digest::DigestAlgorithm;
use caravan::downloader::DownloaderBuilder;
use caravan::remote::{
    ByteStream, DatasetRecord, Navigation, RemoteAsset, RemoteRepository, Selection,
};
use caravan::transfer::ExistingFile;
use caravan::TransportError;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;

struct MemoryAsset {
    path: String,
    content: Vec<u8>,
    etag: String,
}

impl MemoryAsset {
    fn new(path: &str, content: &[u8]) -> Self {
        let mut digester = DigestAlgorithm::Etag
            .digester(Some(content.len() as u64))
            .expect("in-memory assets always have a known size");
        digester.update(content);
        Self {
            path: path.to_owned(),
            content: content.to_vec(),
            etag: digester.finalize(),
        }
    }
}

#[async_trait]
impl RemoteAsset for MemoryAsset {
    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> Option<u64> {
        Some(self.content.len() as u64)
    }

    fn modified(&self) -> Option<chrono::DateTime<Utc>> {
        Some(Utc::now())
    }

    async fn raw_metadata(&self) -> Result<serde_json::Value, TransportError> {
        Ok(json!({ "digest": { "etag": self.etag } }))
    }

    fn download_stream(&self, start: u64) -> ByteStream {
        let chunks: Vec<Result<Bytes, TransportError>> = self.content[start as usize..]
            .chunks(3)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        stream::iter(chunks).boxed()
    }
}

struct MemoryRepository {
    files: Vec<(String, Vec<u8>)>,
}

#[async_trait]
impl RemoteRepository for MemoryRepository {
    async fn navigate(&self) -> Result<Navigation, TransportError> {
        let assets: Vec<_> = self
            .files
            .iter()
            .map(|(path, content)| {
                Ok(Box::new(MemoryAsset::new(path, content)) as Box<dyn RemoteAsset>)
            })
            .collect();
        Ok(Navigation {
            dataset: Some(DatasetRecord {
                raw: json!({ "identifier": "demo-000", "name": "event log demo" }),
                modified: Some(Utc::now()),
            }),
            assets: stream::iter(assets).boxed(),
        })
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let repository = Arc::new(MemoryRepository {
        files: vec![
            ("readme.txt".into(), b"hello from the demo dataset".to_vec()),
            ("sub/data.bin".into(), (0..64u8).collect()),
        ],
    });
    let downloader = DownloaderBuilder::new()
        .existing(ExistingFile::Overwrite)
        .jobs(2)
        .build();

    let mut handle = downloader.download(repository, Selection::Dataset, "output");
    while let Some(record) = handle.next().await {
        println!("{}", serde_json::to_string(&record)?);
    }
    handle.join().await?;
    Ok(())
}
