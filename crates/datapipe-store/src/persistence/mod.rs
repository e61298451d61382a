// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Store interfaces and backend implementations.
//!
//! The daemon talks to persistence exclusively through [`DatapipeStore`] and
//! [`GraphStore`]. Every call is a single-row or single-statement operation;
//! there is no transactional grouping across jobs.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    DatapipeStatus, DatapipeStatusSnapshot, FeatureFlag, IngestJob, IngestTask, JobStatus,
};

/// Status message written on jobs canceled by a purge.
pub const CANCELED_BY_PURGE_MESSAGE: &str = "Job canceled by graph data deletion";

/// Persistence interface used by the datapipe daemon.
#[allow(missing_docs)]
#[async_trait]
pub trait DatapipeStore: Send + Sync {
    /// Read the process-wide status row.
    async fn get_datapipe_status(&self) -> Result<DatapipeStatusSnapshot>;

    /// Unconditionally write the status and partial flag.
    ///
    /// Moving from `Analyzing` to `Idle` stamps `last_complete_analysis_at`.
    async fn set_datapipe_status(&self, status: DatapipeStatus, partial: bool) -> Result<()>;

    /// Set the status only if it is currently `Idle`.
    ///
    /// Returns `true` when the caller now holds the status. The partial flag
    /// is left untouched.
    async fn set_datapipe_status_if_idle(&self, status: DatapipeStatus) -> Result<bool>;

    /// Create a job in `Ingesting`.
    async fn create_ingest_job(&self, user_id: Option<&str>) -> Result<IngestJob>;

    async fn get_ingest_job(&self, job_id: i64) -> Result<Option<IngestJob>>;

    async fn get_ingest_jobs_with_status(&self, status: JobStatus) -> Result<Vec<IngestJob>>;

    /// Persist every field of `job`.
    async fn update_ingest_job(&self, job: &IngestJob) -> Result<()>;

    /// Cancel every non-terminal job. Returns the number of jobs canceled.
    async fn cancel_all_ingest_jobs(&self) -> Result<u64>;

    async fn create_ingest_task(
        &self,
        job_id: Option<i64>,
        file_name: &str,
        provided_file_name: &str,
    ) -> Result<IngestTask>;

    /// All queued tasks, oldest first.
    async fn get_all_ingest_tasks(&self) -> Result<Vec<IngestTask>>;

    async fn get_ingest_tasks_for_job(&self, job_id: i64) -> Result<Vec<IngestTask>>;

    async fn delete_ingest_task(&self, task_id: i64) -> Result<()>;

    /// Delete every queued task. Returns the number of tasks deleted.
    async fn delete_all_ingest_tasks(&self) -> Result<u64>;

    /// Record an analysis request. Idempotent.
    async fn request_analysis(&self, requested_by: &str) -> Result<()>;

    async fn has_analysis_request(&self) -> Result<bool>;

    async fn delete_analysis_request(&self) -> Result<()>;

    /// Record a graph data deletion request. Idempotent.
    async fn request_graph_data_deletion(&self, requested_by: &str) -> Result<()>;

    async fn has_graph_data_deletion_request(&self) -> Result<bool>;

    async fn delete_graph_data_deletion_request(&self) -> Result<()>;

    /// Read a feature flag. Unknown keys read as disabled.
    async fn get_flag_by_key(&self, key: &str) -> Result<FeatureFlag>;

    async fn set_flag(&self, key: &str, enabled: bool) -> Result<()>;
}

/// Graph data written by ingestion and removed by purges.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Store the raw contents of one ingested file.
    async fn write_batch(&self, source_file: &str, payload: &str) -> Result<()>;

    /// Number of stored batches.
    async fn count_batches(&self) -> Result<u64>;

    /// Delete all ingested graph data. Returns the number of batches removed.
    async fn delete_all_graph_data(&self) -> Result<u64>;
}
