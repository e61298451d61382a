// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The scheduler loop.
//!
//! Every tick runs, in order and only while not cancelled:
//!
//! 1. a graph data purge, if one was requested
//! 2. ingest of queued tasks
//! 3. the stale-job timeout check
//! 4. promotion of finished ingest jobs to `Analyzing`
//! 5. analysis, if a job is waiting or an analysis was requested
//!
//! Before step 1 a tick releases any datapipe status left non-idle, since
//! every operation that takes the status finishes within its tick.
//!
//! The next tick is scheduled one interval after the previous tick ends, so
//! ticks never overlap. Orphaned temp files are swept at startup and then
//! once every [`PRUNING_INTERVAL`], detached from the tick.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use datapipe_store::{DatapipeStatus, DatapipeStore, GraphStore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analysis::{AnalysisOrchestrator, Analyzer};
use crate::cache::ResultCache;
use crate::ingest::{IngestProcessor, StaleJobProcessor, ingest_available_tasks};
use crate::jobs::{has_ingest_jobs_waiting_for_analysis, process_finished_ingest_jobs};
use crate::orphans::{FileOperations, OrphanFileSweeper};
use crate::purge::PurgeOrchestrator;

/// Interval between orphaned temp file sweeps.
pub const PRUNING_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Services the daemon drives.
pub struct Collaborators {
    /// Status, job, task, request, and flag storage.
    pub store: Arc<dyn DatapipeStore>,
    /// Ingested graph data.
    pub graph: Arc<dyn GraphStore>,
    /// Analysis engine.
    pub analyzer: Arc<dyn Analyzer>,
    /// Consumes queued files.
    pub ingestor: Arc<dyn IngestProcessor>,
    /// Times out stalled uploads.
    pub stale_jobs: Arc<dyn StaleJobProcessor>,
    /// Cache reset after analysis.
    pub cache: Arc<dyn ResultCache>,
    /// Filesystem access for the orphan sweep.
    pub file_ops: Arc<dyn FileOperations>,
}

/// Configuration for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Time between the end of one tick and the start of the next.
    pub tick_interval: Duration,
    /// Directory holding uploaded files.
    pub temp_dir: PathBuf,
    /// Skip graph analysis.
    pub disable_analysis: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            temp_dir: PathBuf::from(".data/tmp"),
            disable_analysis: false,
        }
    }
}

/// Datapipe daemon.
pub struct Daemon {
    db: Arc<dyn DatapipeStore>,
    ingestor: Arc<dyn IngestProcessor>,
    stale_jobs: Arc<dyn StaleJobProcessor>,
    analysis: AnalysisOrchestrator,
    purge: PurgeOrchestrator,
    sweeper: Arc<OrphanFileSweeper>,
    tick_interval: Duration,
    /// Token of the loop currently running, replaced on every `start`.
    shutdown: Mutex<CancellationToken>,
}

impl Daemon {
    /// Create a daemon.
    pub fn new(collaborators: Collaborators, config: DaemonConfig) -> Self {
        let Collaborators {
            store,
            graph,
            analyzer,
            ingestor,
            stale_jobs,
            cache,
            file_ops,
        } = collaborators;

        Self {
            analysis: AnalysisOrchestrator::new(
                store.clone(),
                analyzer,
                cache,
                config.disable_analysis,
            ),
            purge: PurgeOrchestrator::new(store.clone(), graph),
            sweeper: Arc::new(OrphanFileSweeper::new(file_ops, config.temp_dir)),
            db: store,
            ingestor,
            stale_jobs,
            tick_interval: config.tick_interval,
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        "Data Pipe Daemon"
    }

    /// Run until `ctx` is cancelled or [`stop`](Self::stop) is called.
    ///
    /// A stopped daemon can be started again.
    pub async fn start(&self, ctx: CancellationToken) {
        let run_ctx = CancellationToken::new();
        *self.shutdown.lock().unwrap_or_else(PoisonError::into_inner) = run_ctx.clone();
        {
            let run_ctx = run_ctx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = ctx.cancelled() => run_ctx.cancel(),
                    _ = run_ctx.cancelled() => {}
                }
            });
        }

        info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            temp_dir = %self.sweeper.temp_dir().display(),
            "{} started",
            self.name()
        );

        self.recover_orphaned_status().await;
        self.clear_orphaned_data(&run_ctx).await;

        let mut pruning =
            tokio::time::interval_at(Instant::now() + PRUNING_INTERVAL, PRUNING_INTERVAL);
        let next_tick = tokio::time::sleep(self.tick_interval);
        tokio::pin!(next_tick);

        loop {
            tokio::select! {
                biased;

                _ = run_ctx.cancelled() => {
                    info!("{} received shutdown signal", self.name());
                    break;
                }

                _ = pruning.tick() => {
                    self.clear_orphaned_data(&run_ctx).await;
                }

                _ = &mut next_tick => {
                    self.tick(&run_ctx).await;
                    next_tick.as_mut().reset(Instant::now() + self.tick_interval);
                }
            }
        }

        run_ctx.cancel();
        info!("{} stopped", self.name());
    }

    /// Signal the running loop to exit.
    pub fn stop(&self) {
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Run one scheduling pass.
    pub async fn tick(&self, ctx: &CancellationToken) {
        self.recover_orphaned_status().await;

        let purge_requested = match self.db.has_graph_data_deletion_request().await {
            Ok(requested) => requested,
            Err(e) => {
                error!(error = %e, "Failed to check for graph data deletion request");
                false
            }
        };
        if purge_requested {
            self.purge.purge_graph_data().await;
        }
        if ctx.is_cancelled() {
            return;
        }

        ingest_available_tasks(self.db.as_ref(), self.ingestor.as_ref(), ctx).await;
        if ctx.is_cancelled() {
            return;
        }

        self.stale_jobs.process_stale_ingest_jobs().await;
        if ctx.is_cancelled() {
            return;
        }

        process_finished_ingest_jobs(self.db.as_ref()).await;
        if ctx.is_cancelled() {
            return;
        }

        let jobs_waiting = match has_ingest_jobs_waiting_for_analysis(self.db.as_ref()).await {
            Ok(waiting) => waiting,
            Err(e) => {
                error!(error = %e, "Failed to check for ingest jobs waiting for analysis");
                return;
            }
        };
        let analysis_requested = match self.db.has_analysis_request().await {
            Ok(requested) => requested,
            Err(e) => {
                error!(error = %e, "Failed to check for analysis request");
                false
            }
        };

        if jobs_waiting || analysis_requested {
            self.analysis.run_analysis().await;
        }
    }

    /// Start a detached sweep of temp files no queued task refers to.
    ///
    /// The task list is read here; the sweep itself runs on its own task.
    /// Returns its handle, or `None` when the task list could not be read.
    pub async fn clear_orphaned_data(&self, ctx: &CancellationToken) -> Option<JoinHandle<usize>> {
        let tasks = match self.db.get_all_ingest_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to load ingest tasks for orphan sweep");
                return None;
            }
        };

        // A file uploaded after this snapshot but before the sweep lists the
        // directory is treated as orphaned.
        let expected: Vec<String> = tasks.into_iter().map(|task| task.file_name).collect();
        let sweeper = self.sweeper.clone();
        let ctx = ctx.clone();

        Some(tokio::spawn(async move { sweeper.clear(&ctx, expected).await }))
    }

    /// Release a datapipe status no running operation holds.
    ///
    /// Covers a process that died mid-operation as well as a release that
    /// failed during an earlier tick.
    pub async fn recover_orphaned_status(&self) {
        match self.db.get_datapipe_status().await {
            Ok(snapshot) if snapshot.status != DatapipeStatus::Idle => {
                warn!(
                    status = %snapshot.status,
                    updated_at = %snapshot.updated_at,
                    "Datapipe status was not released, resetting to idle"
                );
                if let Err(e) = self
                    .db
                    .set_datapipe_status(DatapipeStatus::Idle, snapshot.partial)
                    .await
                {
                    error!(error = %e, "Failed to reset datapipe status");
                }
            }
            Ok(_) => debug!("Datapipe status is idle"),
            Err(e) => error!(error = %e, "Failed to read datapipe status"),
        }
    }
}
