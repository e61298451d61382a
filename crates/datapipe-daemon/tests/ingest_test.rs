// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ingest intake and ingest timeout tests.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use datapipe_daemon::ingest::{
    FileIngestor, IngestError, IngestProcessor, IngestTimeoutMonitor, StaleJobProcessor,
    ingest_available_tasks,
};
use datapipe_store::{DatapipeStatus, DatapipeStore, GraphStore, JobStatus, MemoryStore};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_intake_consumes_tasks_and_updates_job() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ingestor = FileIngestor::new(store.clone());
    let job = store.create_ingest_job(Some("user-1")).await.unwrap();
    let first = common::queue_file(&store, dir.path(), Some(job.id), "a.json", "{\"a\":1}").await;
    let second = common::queue_file(&store, dir.path(), Some(job.id), "b.json", "{\"b\":2}").await;
    store
        .set_datapipe_status(DatapipeStatus::Idle, true)
        .await
        .unwrap();

    let consumed =
        ingest_available_tasks(store.as_ref(), &ingestor, &CancellationToken::new()).await;

    assert_eq!(consumed, 2);
    assert!(store.get_all_ingest_tasks().await.unwrap().is_empty());
    assert_eq!(store.count_batches().await.unwrap(), 2);
    assert!(!Path::new(&first.file_name).exists());
    assert!(!Path::new(&second.file_name).exists());

    let job = store.get_ingest_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Ingesting);
    assert_eq!(job.total_files, 2);
    assert_eq!(job.failed_files, 0);

    // The partial flag survives the ingest lock.
    let status = store.get_datapipe_status().await.unwrap();
    assert_eq!(status.status, DatapipeStatus::Idle);
    assert!(status.partial);
}

#[tokio::test]
async fn test_intake_counts_missing_file_as_failed() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = FileIngestor::new(store.clone());
    let job = store.create_ingest_job(None).await.unwrap();
    store
        .create_ingest_task(Some(job.id), "/nonexistent/datapipe/gone.json", "gone.json")
        .await
        .unwrap();

    let consumed =
        ingest_available_tasks(store.as_ref(), &ingestor, &CancellationToken::new()).await;

    assert_eq!(consumed, 1);
    assert!(store.get_all_ingest_tasks().await.unwrap().is_empty());
    assert_eq!(store.count_batches().await.unwrap(), 0);

    let job = store.get_ingest_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.total_files, 1);
    assert_eq!(job.failed_files, 1);
}

#[tokio::test]
async fn test_intake_skips_when_datapipe_busy() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ingestor = FileIngestor::new(store.clone());
    common::queue_file(&store, dir.path(), None, "a.json", "{}").await;
    store
        .set_datapipe_status(DatapipeStatus::Analyzing, false)
        .await
        .unwrap();

    let consumed =
        ingest_available_tasks(store.as_ref(), &ingestor, &CancellationToken::new()).await;

    assert_eq!(consumed, 0);
    assert_eq!(store.get_all_ingest_tasks().await.unwrap().len(), 1);
    assert_eq!(
        store.get_datapipe_status().await.unwrap().status,
        DatapipeStatus::Analyzing
    );
}

#[tokio::test]
async fn test_intake_with_empty_queue_leaves_status_alone() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = FileIngestor::new(store.clone());
    let before = store.get_datapipe_status().await.unwrap();

    let consumed =
        ingest_available_tasks(store.as_ref(), &ingestor, &CancellationToken::new()).await;

    assert_eq!(consumed, 0);
    assert_eq!(store.get_datapipe_status().await.unwrap(), before);
}

#[tokio::test]
async fn test_intake_stops_when_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ingestor = FileIngestor::new(store.clone());
    common::queue_file(&store, dir.path(), None, "a.json", "{}").await;
    let ctx = CancellationToken::new();
    ctx.cancel();

    let consumed = ingest_available_tasks(store.as_ref(), &ingestor, &ctx).await;

    assert_eq!(consumed, 0);
    assert_eq!(store.get_all_ingest_tasks().await.unwrap().len(), 1);
    assert_eq!(
        store.get_datapipe_status().await.unwrap().status,
        DatapipeStatus::Idle
    );
}

#[tokio::test]
async fn test_file_ingestor_reports_missing_file() {
    let store = Arc::new(MemoryStore::new());
    let ingestor = FileIngestor::new(store.clone());
    let task = store
        .create_ingest_task(None, "/nonexistent/datapipe/gone.json", "gone.json")
        .await
        .unwrap();

    let err = ingestor.ingest(&task).await.unwrap_err();
    assert!(matches!(err, IngestError::FileNotFound(_)));
}

#[tokio::test]
async fn test_file_ingestor_surfaces_graph_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let ingestor = FileIngestor::new(store.clone());
    let task = common::queue_file(&store, dir.path(), None, "a.json", "{}").await;
    store.fail_operation("write_batch").await;

    let err = ingestor.ingest(&task).await.unwrap_err();
    assert!(matches!(err, IngestError::Store(_)));
}

#[tokio::test]
async fn test_timeout_monitor_times_out_idle_jobs() {
    let store = Arc::new(MemoryStore::new());
    let mut stale = store.create_ingest_job(None).await.unwrap();
    stale.last_ingest = Utc::now() - chrono::Duration::minutes(30);
    store.update_ingest_job(&stale).await.unwrap();
    let fresh = store.create_ingest_job(None).await.unwrap();
    let analyzing = store.insert_ingest_job(JobStatus::Analyzing).await;

    let monitor = IngestTimeoutMonitor::new(store.clone(), Duration::from_secs(20 * 60));
    assert_eq!(monitor.process_stale_ingest_jobs().await, 1);

    let job = store.get_ingest_job(stale.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::TimedOut);
    assert!(job.end_time.is_some());
    assert!(job.status_message.contains("20 minutes"));

    let job = store.get_ingest_job(fresh.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Ingesting);
    let job = store.get_ingest_job(analyzing.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Analyzing);
}
