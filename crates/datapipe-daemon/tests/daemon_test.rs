// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scheduler loop tests.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{harness, harness_configured, harness_with};
use datapipe_daemon::analysis::MockAnalyzer;
use datapipe_daemon::cache::MemoryCache;
use datapipe_daemon::daemon::PRUNING_INTERVAL;
use datapipe_daemon::ingest::{FileIngestor, IngestTimeoutMonitor};
use datapipe_daemon::orphans::FileOperations;
use datapipe_daemon::{Collaborators, Daemon, DaemonConfig};
use datapipe_store::{DatapipeStatus, DatapipeStore, GraphStore, JobStatus, MemoryStore};
use tokio_util::sync::CancellationToken;

/// Counts directory listings without touching the filesystem.
#[derive(Default)]
struct CountingFileOperations {
    listings: AtomicUsize,
}

#[async_trait]
impl FileOperations for CountingFileOperations {
    async fn list_directory(&self, _path: &Path) -> std::io::Result<Vec<String>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn delete_file(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_finished_job_is_analyzed_and_completed() {
    let h = harness(MockAnalyzer::succeeding());
    let job = h.store.insert_ingest_job(JobStatus::Ingesting).await;

    h.daemon.tick(&CancellationToken::new()).await;

    let job = h.store.get_ingest_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(h.analyzer.run_count(), 1);

    let status = h.store.get_datapipe_status().await.unwrap();
    assert_eq!(status.status, DatapipeStatus::Idle);
    assert!(!status.partial);
}

#[tokio::test]
async fn test_total_failure_fails_waiting_job() {
    let h = harness(MockAnalyzer::failing());
    let job = h.store.insert_ingest_job(JobStatus::Analyzing).await;

    h.daemon.tick(&CancellationToken::new()).await;

    let job = h.store.get_ingest_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    let status = h.store.get_datapipe_status().await.unwrap();
    assert_eq!(status.status, DatapipeStatus::Idle);
    assert!(!status.partial);
}

#[tokio::test]
async fn test_partial_failure_completes_job_and_marks_partial() {
    let h = harness(MockAnalyzer::partially_failing());
    let job = h.store.insert_ingest_job(JobStatus::Analyzing).await;

    h.daemon.tick(&CancellationToken::new()).await;

    let job = h.store.get_ingest_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Complete);

    let status = h.store.get_datapipe_status().await.unwrap();
    assert_eq!(status.status, DatapipeStatus::Idle);
    assert!(status.partial);
}

#[tokio::test]
async fn test_deletion_request_purges_before_anything_else() {
    let h = harness(MockAnalyzer::succeeding());
    let ingesting = h.store.insert_ingest_job(JobStatus::Ingesting).await;
    let analyzing = h.store.insert_ingest_job(JobStatus::Analyzing).await;
    h.queue_file(Some(ingesting.id), "a.json", "{}").await;
    h.store.write_batch("old.json", "{}").await.unwrap();
    h.store
        .request_graph_data_deletion("operator")
        .await
        .unwrap();

    h.daemon.tick(&CancellationToken::new()).await;

    for id in [ingesting.id, analyzing.id] {
        let job = h.store.get_ingest_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
    }
    assert!(h.store.get_all_ingest_tasks().await.unwrap().is_empty());
    assert_eq!(h.store.count_batches().await.unwrap(), 0);
    assert!(!h.store.has_graph_data_deletion_request().await.unwrap());

    // The analysis request raised by the purge is consumed in the same tick.
    assert_eq!(h.analyzer.run_count(), 1);
    assert!(!h.store.has_analysis_request().await.unwrap());
}

#[tokio::test]
async fn test_tick_ingests_then_analyzes_uploaded_job() {
    let h = harness(MockAnalyzer::succeeding());
    let job = h.store.create_ingest_job(Some("user-1")).await.unwrap();
    h.queue_file(Some(job.id), "a.json", "{\"nodes\":[]}").await;
    h.queue_file(Some(job.id), "b.json", "{\"edges\":[]}").await;

    h.daemon.tick(&CancellationToken::new()).await;

    let job = h.store.get_ingest_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.total_files, 2);
    assert_eq!(h.store.count_batches().await.unwrap(), 2);
    assert!(h.store.get_all_ingest_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_idle_tick_does_not_analyze() {
    let h = harness(MockAnalyzer::succeeding());
    h.store.insert_ingest_job(JobStatus::Complete).await;

    h.daemon.tick(&CancellationToken::new()).await;

    assert_eq!(h.analyzer.run_count(), 0);
}

#[tokio::test]
async fn test_analysis_request_alone_triggers_analysis() {
    let h = harness(MockAnalyzer::succeeding());
    h.store.request_analysis("operator").await.unwrap();

    h.daemon.tick(&CancellationToken::new()).await;

    assert_eq!(h.analyzer.run_count(), 1);
    assert!(!h.store.has_analysis_request().await.unwrap());
}

#[tokio::test]
async fn test_disabled_analysis_leaves_jobs_waiting() {
    let h = harness_with(MockAnalyzer::succeeding(), true);
    let job = h.store.insert_ingest_job(JobStatus::Ingesting).await;

    h.daemon.tick(&CancellationToken::new()).await;

    let job = h.store.get_ingest_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Analyzing);
    assert_eq!(h.analyzer.run_count(), 0);
}

#[tokio::test]
async fn test_cancelled_tick_does_nothing_after_purge() {
    let h = harness(MockAnalyzer::succeeding());
    let job = h.store.insert_ingest_job(JobStatus::Ingesting).await;
    let ctx = CancellationToken::new();
    ctx.cancel();

    h.daemon.tick(&ctx).await;

    let job = h.store.get_ingest_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Ingesting);
    assert_eq!(h.analyzer.run_count(), 0);
}

#[tokio::test]
async fn test_deletion_request_lookup_error_skips_purge_only() {
    let h = harness(MockAnalyzer::succeeding());
    let job = h.store.insert_ingest_job(JobStatus::Ingesting).await;
    h.store
        .fail_operation("has_graph_data_deletion_request")
        .await;

    h.daemon.tick(&CancellationToken::new()).await;

    let job = h.store.get_ingest_job(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Complete);
}

#[tokio::test]
async fn test_recover_orphaned_status_keeps_partial_flag() {
    let h = harness(MockAnalyzer::succeeding());
    h.store
        .set_datapipe_status(DatapipeStatus::Analyzing, true)
        .await
        .unwrap();

    h.daemon.recover_orphaned_status().await;

    let status = h.store.get_datapipe_status().await.unwrap();
    assert_eq!(status.status, DatapipeStatus::Idle);
    assert!(status.partial);
}

#[tokio::test]
async fn test_clear_orphaned_data_keeps_queued_files() {
    let h = harness(MockAnalyzer::succeeding());
    let queued = h.queue_file(None, "a.json", "{}").await;
    std::fs::write(h.temp_dir.path().join("b.json"), "{}").unwrap();

    let handle = h
        .daemon
        .clear_orphaned_data(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(handle.await.unwrap(), 1);
    assert!(std::path::Path::new(&queued.file_name).exists());
    assert!(!h.temp_dir.path().join("b.json").exists());
}

#[tokio::test]
async fn test_clear_orphaned_data_without_task_list_does_not_sweep() {
    let h = harness(MockAnalyzer::succeeding());
    std::fs::write(h.temp_dir.path().join("b.json"), "{}").unwrap();
    h.store.fail_operation("get_all_ingest_tasks").await;

    let handle = h
        .daemon
        .clear_orphaned_data(&CancellationToken::new())
        .await;

    assert!(handle.is_none());
    assert!(h.temp_dir.path().join("b.json").exists());
}

#[tokio::test]
async fn test_start_runs_ticks_until_stopped() {
    let h = harness(MockAnalyzer::succeeding());
    h.store
        .set_datapipe_status(DatapipeStatus::Purging, false)
        .await
        .unwrap();
    let job = h.store.insert_ingest_job(JobStatus::Ingesting).await;
    let daemon = Arc::new(h.daemon);

    let handle = {
        let daemon = daemon.clone();
        tokio::spawn(async move { daemon.start(CancellationToken::new()).await })
    };

    let mut completed = false;
    for _ in 0..100 {
        let current = h.store.get_ingest_job(job.id).await.unwrap().unwrap();
        if current.status == JobStatus::Complete {
            completed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(completed, "job should complete once the stale status is recovered");

    daemon.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_start_exits_when_context_cancelled() {
    let h = harness(MockAnalyzer::succeeding());
    let daemon = Arc::new(h.daemon);
    let ctx = CancellationToken::new();

    let handle = {
        let daemon = daemon.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { daemon.start(ctx).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    ctx.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_status_left_by_failed_release_is_recovered_next_tick() {
    let h = harness(MockAnalyzer::succeeding());
    h.store.insert_ingest_job(JobStatus::Analyzing).await;
    h.store.fail_operation("set_datapipe_status").await;

    h.daemon.tick(&CancellationToken::new()).await;

    let status = h.store.get_datapipe_status().await.unwrap();
    assert_eq!(status.status, DatapipeStatus::Analyzing);

    h.store.clear_failures().await;
    let waiting = h.store.insert_ingest_job(JobStatus::Ingesting).await;

    h.daemon.tick(&CancellationToken::new()).await;

    let job = h.store.get_ingest_job(waiting.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(h.analyzer.run_count(), 2);

    let analyzing = h.store.insert_ingest_job(JobStatus::Analyzing).await;
    h.store
        .request_graph_data_deletion("operator")
        .await
        .unwrap();

    h.daemon.tick(&CancellationToken::new()).await;

    let job = h.store.get_ingest_job(analyzing.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Canceled);
    assert!(!h.store.has_graph_data_deletion_request().await.unwrap());

    let status = h.store.get_datapipe_status().await.unwrap();
    assert_eq!(status.status, DatapipeStatus::Idle);
}

#[tokio::test]
async fn test_start_sweeps_orphans_before_first_tick() {
    let h = harness_configured(MockAnalyzer::succeeding(), false, Duration::from_secs(3600));
    let queued = h.queue_file(None, "a.json", "{}").await;
    let orphan = h.temp_dir.path().join("orphan.json");
    std::fs::write(&orphan, "{}").unwrap();
    let daemon = Arc::new(h.daemon);

    let handle = {
        let daemon = daemon.clone();
        tokio::spawn(async move { daemon.start(CancellationToken::new()).await })
    };

    let mut swept = false;
    for _ in 0..100 {
        if !orphan.exists() {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(swept, "orphan should be removed by the startup sweep");
    assert!(Path::new(&queued.file_name).exists());
    assert_eq!(h.analyzer.run_count(), 0);

    daemon.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_orphan_sweep_repeats_every_pruning_interval() {
    let store = Arc::new(MemoryStore::new());
    let file_ops = Arc::new(CountingFileOperations::default());
    let daemon = Arc::new(Daemon::new(
        Collaborators {
            store: store.clone(),
            graph: store.clone(),
            analyzer: Arc::new(MockAnalyzer::succeeding()),
            ingestor: Arc::new(FileIngestor::new(store.clone())),
            stale_jobs: Arc::new(IngestTimeoutMonitor::new(
                store.clone(),
                Duration::from_secs(20 * 60),
            )),
            cache: Arc::new(MemoryCache::new()),
            file_ops: file_ops.clone(),
        },
        DaemonConfig {
            tick_interval: Duration::from_secs(3600),
            temp_dir: "/nonexistent/datapipe-tmp".into(),
            disable_analysis: false,
        },
    ));

    let handle = {
        let daemon = daemon.clone();
        tokio::spawn(async move { daemon.start(CancellationToken::new()).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(file_ops.listings.load(Ordering::SeqCst), 1);

    tokio::time::sleep(PRUNING_INTERVAL - Duration::from_secs(2)).await;
    assert_eq!(file_ops.listings.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(file_ops.listings.load(Ordering::SeqCst), 2);

    daemon.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_analysis_runs_never_overlap() {
    let mut analyzer = MockAnalyzer::succeeding();
    analyzer.execution_delay = Duration::from_millis(50);
    let h = harness_configured(analyzer, false, Duration::from_millis(5));
    let daemon = Arc::new(h.daemon);

    let handle = {
        let daemon = daemon.clone();
        tokio::spawn(async move { daemon.start(CancellationToken::new()).await })
    };

    let requester = {
        let store = h.store.clone();
        tokio::spawn(async move {
            loop {
                store.request_analysis("operator").await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    requester.abort();
    daemon.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(h.analyzer.run_count() >= 2);
    assert_eq!(h.analyzer.max_concurrent_runs(), 1);
}

#[tokio::test]
async fn test_stopped_daemon_can_start_again() {
    let h = harness(MockAnalyzer::succeeding());
    let daemon = Arc::new(h.daemon);

    for _ in 0..2 {
        let job = h.store.insert_ingest_job(JobStatus::Ingesting).await;
        let handle = {
            let daemon = daemon.clone();
            tokio::spawn(async move { daemon.start(CancellationToken::new()).await })
        };

        let mut completed = false;
        for _ in 0..100 {
            let current = h.store.get_ingest_job(job.id).await.unwrap().unwrap();
            if current.status == JobStatus::Complete {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(completed, "each run should process the new job");

        daemon.stop();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
