// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ingest job lifecycle transitions.
//!
//! ```text
//! Ingesting --(no tasks left)--> Analyzing --(analysis ok/partial)--> Complete
//!                                          \--(analysis failed)-----> Failed
//! ```
//!
//! Every job is updated individually. A failed update is logged and the
//! remaining jobs are still processed; there is no rollback.

use chrono::Utc;
use datapipe_store::{DatapipeStore, JobStatus, StoreError};
use tracing::{debug, error, info};

/// Whether any job is waiting for analysis.
pub async fn has_ingest_jobs_waiting_for_analysis(
    db: &dyn DatapipeStore,
) -> Result<bool, StoreError> {
    let jobs = db.get_ingest_jobs_with_status(JobStatus::Analyzing).await?;
    Ok(!jobs.is_empty())
}

/// Move every `Ingesting` job with no remaining tasks to `Analyzing`.
///
/// Returns the number of jobs moved.
pub async fn process_finished_ingest_jobs(db: &dyn DatapipeStore) -> usize {
    let jobs = match db.get_ingest_jobs_with_status(JobStatus::Ingesting).await {
        Ok(jobs) => jobs,
        Err(e) => {
            error!(error = %e, "Failed to load ingesting jobs");
            return 0;
        }
    };

    let mut moved = 0;
    for mut job in jobs {
        let remaining = match db.get_ingest_tasks_for_job(job.id).await {
            Ok(tasks) => tasks.len(),
            Err(e) => {
                error!(job_id = job.id, error = %e, "Failed to load tasks for ingest job");
                continue;
            }
        };

        if remaining > 0 {
            debug!(job_id = job.id, remaining, "Ingest job still has queued tasks");
            continue;
        }

        job.transition(JobStatus::Analyzing, Utc::now());
        match db.update_ingest_job(&job).await {
            Ok(()) => {
                info!(job_id = job.id, "Ingest job finished ingesting, waiting for analysis");
                moved += 1;
            }
            Err(e) => {
                error!(job_id = job.id, error = %e, "Failed to mark ingest job as analyzing");
            }
        }
    }

    moved
}

/// Move every `Analyzing` job to `Failed`.
pub async fn fail_analyzed_ingest_jobs(db: &dyn DatapipeStore) -> usize {
    transition_analyzed_ingest_jobs(db, JobStatus::Failed).await
}

/// Move every `Analyzing` job to `Complete`.
pub async fn complete_analyzed_ingest_jobs(db: &dyn DatapipeStore) -> usize {
    transition_analyzed_ingest_jobs(db, JobStatus::Complete).await
}

async fn transition_analyzed_ingest_jobs(db: &dyn DatapipeStore, status: JobStatus) -> usize {
    let jobs = match db.get_ingest_jobs_with_status(JobStatus::Analyzing).await {
        Ok(jobs) => jobs,
        Err(e) => {
            error!(error = %e, target_status = %status, "Failed to load analyzed ingest jobs");
            return 0;
        }
    };

    let now = Utc::now();
    let mut updated = 0;
    for mut job in jobs {
        job.transition(status, now);
        match db.update_ingest_job(&job).await {
            Ok(()) => updated += 1,
            Err(e) => {
                error!(
                    job_id = job.id,
                    target_status = %status,
                    error = %e,
                    "Failed to update analyzed ingest job"
                );
            }
        }
    }

    if updated > 0 {
        info!(count = updated, status = %status, "Updated analyzed ingest jobs");
    }
    updated
}
