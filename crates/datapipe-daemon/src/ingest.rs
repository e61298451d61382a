// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ingest intake and stale-job handling.
//!
//! [`ingest_available_tasks`] drains the task queue while holding the
//! `Ingesting` datapipe status. [`IngestTimeoutMonitor`] times out jobs
//! whose uploads stopped arriving.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use datapipe_store::{
    DatapipeStatus, DatapipeStore, GraphStore, IngestTask, JobStatus, StoreError,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors from ingesting a single task.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    /// The uploaded file is no longer in temp storage.
    #[error("Ingest file not found: {0}")]
    FileNotFound(String),

    /// Reading the uploaded file failed.
    #[error("Failed to read ingest file {path}: {source}")]
    Io {
        /// File being read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing to the graph failed.
    #[error("Graph write failed: {0}")]
    Store(#[from] StoreError),
}

/// Consumes one queued file into the graph.
#[async_trait]
pub trait IngestProcessor: Send + Sync {
    /// Ingest the file referenced by `task`.
    async fn ingest(&self, task: &IngestTask) -> Result<(), IngestError>;
}

/// Writes the raw file contents to the graph store as one batch.
pub struct FileIngestor {
    graph: Arc<dyn GraphStore>,
}

impl FileIngestor {
    /// Create an ingestor writing to `graph`.
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl IngestProcessor for FileIngestor {
    async fn ingest(&self, task: &IngestTask) -> Result<(), IngestError> {
        let payload = tokio::fs::read_to_string(&task.file_name)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => IngestError::FileNotFound(task.file_name.clone()),
                _ => IngestError::Io {
                    path: task.file_name.clone(),
                    source: e,
                },
            })?;

        self.graph
            .write_batch(&task.provided_file_name, &payload)
            .await?;
        Ok(())
    }
}

/// Drain the ingest task queue.
///
/// Takes the `Ingesting` status for the duration and releases it back to
/// `Idle` with the previous partial flag. Does nothing when the queue is
/// empty or another operation holds the status. Returns the number of tasks
/// consumed.
pub async fn ingest_available_tasks(
    db: &dyn DatapipeStore,
    processor: &dyn IngestProcessor,
    ctx: &CancellationToken,
) -> usize {
    let tasks = match db.get_all_ingest_tasks().await {
        Ok(tasks) if tasks.is_empty() => return 0,
        Ok(tasks) => tasks,
        Err(e) => {
            error!(error = %e, "Failed to load ingest tasks");
            return 0;
        }
    };

    let partial = match db.get_datapipe_status().await {
        Ok(snapshot) => snapshot.partial,
        Err(e) => {
            error!(error = %e, "Failed to read datapipe status before ingest");
            return 0;
        }
    };

    match db
        .set_datapipe_status_if_idle(DatapipeStatus::Ingesting)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                queued = tasks.len(),
                "Datapipe busy, deferring ingest of queued tasks"
            );
            return 0;
        }
        Err(e) => {
            error!(error = %e, "Failed to set datapipe status to ingesting");
            return 0;
        }
    }

    info!(count = tasks.len(), "Ingesting queued files");

    let mut consumed = 0;
    for task in tasks {
        if ctx.is_cancelled() {
            info!(consumed, "Ingest interrupted by shutdown");
            break;
        }
        ingest_task(db, processor, &task).await;
        consumed += 1;
    }

    if let Err(e) = db
        .set_datapipe_status(DatapipeStatus::Idle, partial)
        .await
    {
        error!(error = %e, "Failed to release datapipe status after ingest");
    }

    consumed
}

async fn ingest_task(db: &dyn DatapipeStore, processor: &dyn IngestProcessor, task: &IngestTask) {
    let failed = match processor.ingest(task).await {
        Ok(()) => {
            debug!(task_id = task.id, file = %task.file_name, "Ingested file");
            false
        }
        Err(IngestError::FileNotFound(path)) => {
            warn!(task_id = task.id, file = %path, "Ingest file missing, dropping task");
            true
        }
        Err(e) => {
            error!(task_id = task.id, file = %task.file_name, error = %e, "Failed to ingest file");
            true
        }
    };

    if let Err(e) = db.delete_ingest_task(task.id).await {
        error!(task_id = task.id, error = %e, "Failed to delete ingest task");
    }

    match tokio::fs::remove_file(&task.file_name).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(file = %task.file_name, error = %e, "Failed to remove ingested file"),
    }

    let Some(job_id) = task.job_id else {
        return;
    };

    match db.get_ingest_job(job_id).await {
        Ok(Some(mut job)) => {
            job.total_files += 1;
            if failed {
                job.failed_files += 1;
            }
            job.last_ingest = Utc::now();
            if let Err(e) = db.update_ingest_job(&job).await {
                error!(job_id, error = %e, "Failed to update ingest job counters");
            }
        }
        Ok(None) => warn!(job_id, task_id = task.id, "Ingest task references unknown job"),
        Err(e) => error!(job_id, error = %e, "Failed to load ingest job"),
    }
}

/// Times out ingest jobs that stopped receiving files.
#[async_trait]
pub trait StaleJobProcessor: Send + Sync {
    /// Process stale jobs. Returns the number of jobs timed out.
    async fn process_stale_ingest_jobs(&self) -> usize;
}

/// Default time without ingest activity before a job is timed out.
pub const DEFAULT_INGEST_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Moves `Ingesting` jobs without recent activity to `TimedOut`.
pub struct IngestTimeoutMonitor {
    db: Arc<dyn DatapipeStore>,
    timeout: Duration,
}

impl IngestTimeoutMonitor {
    /// Create a monitor with the given inactivity timeout.
    pub fn new(db: Arc<dyn DatapipeStore>, timeout: Duration) -> Self {
        Self { db, timeout }
    }
}

#[async_trait]
impl StaleJobProcessor for IngestTimeoutMonitor {
    async fn process_stale_ingest_jobs(&self) -> usize {
        let jobs = match self
            .db
            .get_ingest_jobs_with_status(JobStatus::Ingesting)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to load ingesting jobs for timeout check");
                return 0;
            }
        };

        let now = Utc::now();
        let mut timed_out = 0;
        for mut job in jobs {
            // A last_ingest in the future converts to Err and is never stale.
            let stale = (now - job.last_ingest)
                .to_std()
                .map(|idle| idle > self.timeout)
                .unwrap_or(false);
            if !stale {
                continue;
            }

            job.transition(JobStatus::TimedOut, now);
            job.status_message = format!(
                "Ingest timeout: no ingest activity observed in {} minutes. Upload incomplete.",
                self.timeout.as_secs() / 60
            );
            match self.db.update_ingest_job(&job).await {
                Ok(()) => {
                    warn!(job_id = job.id, last_ingest = %job.last_ingest, "Ingest job timed out");
                    timed_out += 1;
                }
                Err(e) => error!(job_id = job.id, error = %e, "Failed to time out ingest job"),
            }
        }

        timed_out
    }
}
