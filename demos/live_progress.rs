//! Renders the event stream of a run as live per-file progress bars.
//!
//! The downloader itself knows nothing about terminals; this consumer maps
//! event records onto `indicatif` bars keyed by path.
//!
//! Run with: `cargo run --example live_progress`

use async_trait::async_trait;
use bytes::Bytes;
use caravan::digest::DigestAlgorithm;
use caravan::downloader::DownloaderBuilder;
use caravan::remote::{ByteStream, Navigation, RemoteAsset, RemoteRepository, Selection};
use caravan::transfer::{ExistingFile, TransferStatus};
use caravan::TransportError;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct SlowAsset {
    path: String,
    content: Vec<u8>,
    etag: String,
}

impl SlowAsset {
    fn new(path: &str, size: usize) -> Self {
        let content: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        let mut digester = DigestAlgorithm::Etag
            .digester(Some(size as u64))
            .expect("demo assets are small");
        digester.update(&content);
        Self {
            path: path.to_owned(),
            etag: digester.finalize(),
            content,
        }
    }
}

#[async_trait]
impl RemoteAsset for SlowAsset {
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
            .chunks(1024)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        // Pace the chunks so the bars are visible.
        stream::iter(chunks)
            .then(|chunk| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                chunk
            })
            .boxed()
    }
}

struct SlowRepository;

#[async_trait]
impl RemoteRepository for SlowRepository {
    async fn navigate(&self) -> Result<Navigation, TransportError> {
        let assets: Vec<_> = (1..=4)
            .map(|i| {
                Ok(Box::new(SlowAsset::new(&format!("part-{i}.bin"), 64 * 1024 * i))
                    as Box<dyn RemoteAsset>)
            })
            .collect();
        Ok(Navigation {
            dataset: None,
            assets: stream::iter(assets).boxed(),
        })
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let downloader = DownloaderBuilder::new()
        .existing(ExistingFile::Overwrite)
        .jobs(4)
        .build();
    let mut handle = downloader.download(Arc::new(SlowRepository), Selection::Dataset, "output");

    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template("{msg:20} [{bar:40}] {bytes}/{total_bytes}")
        .expect("valid template")
        .progress_chars("=> ");
    let mut bars: HashMap<String, ProgressBar> = HashMap::new();

    while let Some(record) = handle.next().await {
        let Some(path) = record.path.clone() else {
            continue;
        };
        let bar = bars.entry(path.clone()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(0).with_style(style.clone()));
            bar.set_message(path.clone());
            bar
        });
        if let Some(size) = record.size {
            bar.set_length(size);
        }
        if let Some(done) = record.done {
            bar.set_position(done);
        }
        match record.status {
            Some(TransferStatus::Done) => bar.finish_with_message(format!("{path} done")),
            Some(TransferStatus::Error) => bar.abandon_with_message(format!(
                "{path} failed: {}",
                record.message.unwrap_or_default()
            )),
            Some(TransferStatus::Skipped) => bar.finish_with_message(format!("{path} skipped")),
            _ => {}
        }
    }
    handle.join().await?;
    Ok(())
}
