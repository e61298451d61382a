// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for datapipe-daemon integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use datapipe_daemon::analysis::MockAnalyzer;
use datapipe_daemon::cache::MemoryCache;
use datapipe_daemon::ingest::{FileIngestor, IngestTimeoutMonitor};
use datapipe_daemon::orphans::OsFileOperations;
use datapipe_daemon::{Collaborators, Daemon, DaemonConfig};
use datapipe_store::{DatapipeStore, IngestTask, MemoryStore};
use tempfile::TempDir;

/// A daemon wired to in-memory collaborators and a scratch temp directory.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub analyzer: Arc<MockAnalyzer>,
    pub cache: Arc<MemoryCache>,
    pub temp_dir: TempDir,
    pub daemon: Daemon,
}

pub fn harness(analyzer: MockAnalyzer) -> Harness {
    harness_with(analyzer, false)
}

pub fn harness_with(analyzer: MockAnalyzer, disable_analysis: bool) -> Harness {
    harness_configured(analyzer, disable_analysis, Duration::from_millis(20))
}

pub fn harness_configured(
    analyzer: MockAnalyzer,
    disable_analysis: bool,
    tick_interval: Duration,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let analyzer = Arc::new(analyzer);
    let cache = Arc::new(MemoryCache::new());
    let temp_dir = tempfile::tempdir().unwrap();

    let daemon = Daemon::new(
        Collaborators {
            store: store.clone(),
            graph: store.clone(),
            analyzer: analyzer.clone(),
            ingestor: Arc::new(FileIngestor::new(store.clone())),
            stale_jobs: Arc::new(IngestTimeoutMonitor::new(
                store.clone(),
                Duration::from_secs(20 * 60),
            )),
            cache: cache.clone(),
            file_ops: Arc::new(OsFileOperations),
        },
        DaemonConfig {
            tick_interval,
            temp_dir: temp_dir.path().to_path_buf(),
            disable_analysis,
        },
    );

    Harness {
        store,
        analyzer,
        cache,
        temp_dir,
        daemon,
    }
}

impl Harness {
    /// Write `contents` into the temp directory and queue a task for it.
    pub async fn queue_file(&self, job_id: Option<i64>, name: &str, contents: &str) -> IngestTask {
        queue_file(self.store.as_ref(), self.temp_dir.path(), job_id, name, contents).await
    }
}

pub async fn queue_file(
    store: &MemoryStore,
    dir: &Path,
    job_id: Option<i64>,
    name: &str,
    contents: &str,
) -> IngestTask {
    let path = dir.join(name);
    tokio::fs::write(&path, contents).await.unwrap();
    store
        .create_ingest_task(job_id, &path.to_string_lossy(), name)
        .await
        .unwrap()
}
