//! Tests for the staging-directory protocol: locking, resume, manifest
//! invalidation, and atomic promotion.

use caravan::digest::DigestAlgorithm;
use caravan::staging::{staging_dir_for, StagingHandle};
use caravan::Error;
use std::collections::BTreeMap;

mod common;
use common::helpers::*;

fn etag_only(value: &str) -> BTreeMap<DigestAlgorithm, String> {
    let mut digests = BTreeMap::new();
    digests.insert(DigestAlgorithm::Etag, value.to_owned());
    digests
}

#[tokio::test]
async fn test_fresh_open_creates_layout() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");
    let digests = etag_only("aaaa-1");

    let stage = StagingHandle::open(&target, &digests).await.unwrap();
    assert_eq!(stage.offset(), 0);

    let staging = staging_dir_for(&target);
    assert!(staging.join("file").exists());
    assert!(staging.join("lock").exists());
    let manifest: BTreeMap<String, String> =
        serde_json::from_slice(&std::fs::read(staging.join("checksum")).unwrap()).unwrap();
    assert_eq!(manifest.get("etag").map(String::as_str), Some("aaaa-1"));

    stage.abort().await;
}

#[tokio::test]
async fn test_commit_promotes_atomically_and_cleans_up() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");
    let digests = etag_only("aaaa-1");

    let mut stage = StagingHandle::open(&target, &digests).await.unwrap();
    stage.append(b"hello ").await.unwrap();
    stage.append(b"world").await.unwrap();
    stage.commit().await.unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), b"hello world");
    assert!(!staging_dir_for(&target).exists());
}

#[tokio::test]
async fn test_commit_replaces_existing_destination() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");
    std::fs::write(&target, b"old content").unwrap();

    let mut stage = StagingHandle::open(&target, &etag_only("aaaa-1"))
        .await
        .unwrap();
    stage.append(b"new").await.unwrap();
    stage.commit().await.unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), b"new");
}

#[tokio::test]
async fn test_abort_keeps_partial_data_for_resume() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");
    let digests = etag_only("aaaa-1");

    let mut stage = StagingHandle::open(&target, &digests).await.unwrap();
    stage.append(b"abcd").await.unwrap();
    stage.abort().await;

    assert!(!target.exists());
    let staging = staging_dir_for(&target);
    assert!(staging.join("file").exists());

    // Reopen with the same digests: resume from the aborted offset.
    let stage = StagingHandle::open(&target, &digests).await.unwrap();
    assert_eq!(stage.offset(), 4);
    stage.abort().await;
}

#[tokio::test]
async fn test_resume_appends_to_partial_file() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");
    let digests = etag_only("aaaa-1");

    let mut stage = StagingHandle::open(&target, &digests).await.unwrap();
    stage.append(b"abcd").await.unwrap();
    stage.abort().await;

    let mut stage = StagingHandle::open(&target, &digests).await.unwrap();
    assert_eq!(stage.offset(), 4);
    stage.append(b"ef").await.unwrap();
    stage.commit().await.unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), b"abcdef");
}

#[tokio::test]
async fn test_changed_digest_discards_partial_data() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");

    let mut stage = StagingHandle::open(&target, &etag_only("aaaa-1"))
        .await
        .unwrap();
    stage.append(b"stale bytes").await.unwrap();
    stage.abort().await;

    // The remote content changed: different expected digest.
    let stage = StagingHandle::open(&target, &etag_only("bbbb-1"))
        .await
        .unwrap();
    assert_eq!(stage.offset(), 0);
    assert_eq!(
        std::fs::metadata(stage.partial_path()).unwrap().len(),
        0,
        "stale partial data must be discarded"
    );
    stage.abort().await;
}

#[tokio::test]
async fn test_intersecting_manifest_resumes_on_match() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");

    // First run recorded only the etag.
    let mut stage = StagingHandle::open(&target, &etag_only("aaaa-1"))
        .await
        .unwrap();
    stage.append(b"abcd").await.unwrap();
    stage.abort().await;

    // Second run also knows a sha256; the intersection (etag) matches.
    let mut digests = etag_only("aaaa-1");
    digests.insert(DigestAlgorithm::Sha256, "f".repeat(64));
    let stage = StagingHandle::open(&target, &digests).await.unwrap();
    assert_eq!(stage.offset(), 4);
    stage.abort().await;
}

#[tokio::test]
async fn test_disjoint_manifest_restarts() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");

    let mut stage = StagingHandle::open(&target, &etag_only("aaaa-1"))
        .await
        .unwrap();
    stage.append(b"abcd").await.unwrap();
    stage.abort().await;

    // No algorithm in common with the recorded manifest.
    let mut digests = BTreeMap::new();
    digests.insert(DigestAlgorithm::Sha256, "f".repeat(64));
    let stage = StagingHandle::open(&target, &digests).await.unwrap();
    assert_eq!(stage.offset(), 0);
    stage.abort().await;
}

#[tokio::test]
async fn test_corrupt_manifest_restarts() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");
    let digests = etag_only("aaaa-1");

    let mut stage = StagingHandle::open(&target, &digests).await.unwrap();
    stage.append(b"abcd").await.unwrap();
    stage.abort().await;

    std::fs::write(staging_dir_for(&target).join("checksum"), b"not json").unwrap();

    let stage = StagingHandle::open(&target, &digests).await.unwrap();
    assert_eq!(stage.offset(), 0);
    stage.abort().await;
}

#[tokio::test]
async fn test_lock_is_mutually_exclusive() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");
    let digests = etag_only("aaaa-1");

    let first = StagingHandle::open(&target, &digests).await.unwrap();
    let second = StagingHandle::open(&target, &digests).await;
    match second {
        Err(Error::LockHeld(path)) => assert_eq!(path, target),
        Err(other) => panic!("expected LockHeld, got {other:?}"),
        Ok(_) => panic!("expected LockHeld, got a handle"),
    }

    // Releasing the first handle makes the destination lockable again.
    first.abort().await;
    let third = StagingHandle::open(&target, &digests).await.unwrap();
    third.abort().await;
}

#[tokio::test]
async fn test_interrupted_transfer_leaves_destination_untouched() {
    let dir = create_temp_dir();
    let target = dir.path().join("data.bin");
    std::fs::write(&target, b"committed state").unwrap();

    let mut stage = StagingHandle::open(&target, &etag_only("aaaa-1"))
        .await
        .unwrap();
    stage.append(b"partial").await.unwrap();
    // Simulated interrupt: the handle is dropped without commit or abort.
    drop(stage);

    assert_eq!(std::fs::read(&target).unwrap(), b"committed state");
    assert!(staging_dir_for(&target).exists());
}
