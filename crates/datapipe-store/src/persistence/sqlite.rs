// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed store implementation.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::model::{
    DatapipeStatus, DatapipeStatusSnapshot, FeatureFlag, IngestJob, IngestTask, JobStatus,
    RequestKind,
};

use super::{CANCELED_BY_PURGE_MESSAGE, DatapipeStore, GraphStore};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(sqlx::FromRow)]
struct StatusRow {
    status: String,
    partial: bool,
    updated_at: DateTime<Utc>,
    last_complete_analysis_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct IngestJobRow {
    id: i64,
    user_id: Option<String>,
    status: String,
    status_message: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    last_ingest: DateTime<Utc>,
    total_files: i32,
    failed_files: i32,
}

impl TryFrom<IngestJobRow> for IngestJob {
    type Error = StoreError;

    fn try_from(row: IngestJobRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            status: row.status.parse()?,
            status_message: row.status_message,
            start_time: row.start_time,
            end_time: row.end_time,
            last_ingest: row.last_ingest,
            total_files: row.total_files,
            failed_files: row.failed_files,
        })
    }
}

const JOB_COLUMNS: &str = "id, user_id, status, status_message, start_time, end_time, last_ingest, total_files, failed_files";

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. Migrations are not run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path` and apply migrations.
    ///
    /// ```ignore
    /// let store = SqliteStore::from_path(".data/datapipe.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        MIGRATOR.run(&pool).await?;
        debug!(path = %path.display(), "SQLite store ready");

        Ok(Self { pool })
    }

    /// Apply embedded migrations to the wrapped pool.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_request(&self, kind: RequestKind, requested_by: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO datapipe_requests (request_type, requested_by, requested_at)
            VALUES (?, ?, ?)
            ON CONFLICT (request_type) DO NOTHING
            "#,
        )
        .bind(kind.as_str())
        .bind(requested_by)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has_request(&self, kind: RequestKind) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM datapipe_requests WHERE request_type = ?")
                .bind(kind.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count > 0)
    }

    async fn delete_request(&self, kind: RequestKind) -> Result<()> {
        sqlx::query("DELETE FROM datapipe_requests WHERE request_type = ?")
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl DatapipeStore for SqliteStore {
    async fn get_datapipe_status(&self) -> Result<DatapipeStatusSnapshot> {
        let row = sqlx::query_as::<_, StatusRow>(
            r#"
            SELECT status, partial, updated_at, last_complete_analysis_at
            FROM datapipe_status
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DatapipeStatusSnapshot {
            status: row.status.parse()?,
            partial: row.partial,
            updated_at: row.updated_at,
            last_complete_analysis_at: row.last_complete_analysis_at,
        })
    }

    async fn set_datapipe_status(&self, status: DatapipeStatus, partial: bool) -> Result<()> {
        let now = Utc::now();

        // SQLite evaluates every SET expression against the old row.
        sqlx::query(
            r#"
            UPDATE datapipe_status
            SET last_complete_analysis_at = CASE
                    WHEN status = 'analyzing' AND ? = 'idle' THEN ?
                    ELSE last_complete_analysis_at
                END,
                status = ?,
                partial = ?,
                updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(status.as_str())
        .bind(partial)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_datapipe_status_if_idle(&self, status: DatapipeStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE datapipe_status
            SET status = ?, updated_at = ?
            WHERE id = 1 AND status = 'idle'
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_ingest_job(&self, user_id: Option<&str>) -> Result<IngestJob> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, IngestJobRow>(&format!(
            r#"
            INSERT INTO ingest_jobs (user_id, status, status_message, start_time, last_ingest)
            VALUES (?, ?, '', ?, ?)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(JobStatus::Ingesting.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_ingest_job(&self, job_id: i64) -> Result<Option<IngestJob>> {
        let row = sqlx::query_as::<_, IngestJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM ingest_jobs WHERE id = ?"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(IngestJob::try_from).transpose()
    }

    async fn get_ingest_jobs_with_status(&self, status: JobStatus) -> Result<Vec<IngestJob>> {
        let rows = sqlx::query_as::<_, IngestJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM ingest_jobs WHERE status = ? ORDER BY id"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(IngestJob::try_from).collect()
    }

    async fn update_ingest_job(&self, job: &IngestJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET user_id = ?, status = ?, status_message = ?, start_time = ?, end_time = ?,
                last_ingest = ?, total_files = ?, failed_files = ?
            WHERE id = ?
            "#,
        )
        .bind(&job.user_id)
        .bind(job.status.as_str())
        .bind(&job.status_message)
        .bind(job.start_time)
        .bind(job.end_time)
        .bind(job.last_ingest)
        .bind(job.total_files)
        .bind(job.failed_files)
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(job.id));
        }

        Ok(())
    }

    async fn cancel_all_ingest_jobs(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = ?, status_message = ?, end_time = ?
            WHERE status IN (?, ?)
            "#,
        )
        .bind(JobStatus::Canceled.as_str())
        .bind(CANCELED_BY_PURGE_MESSAGE)
        .bind(Utc::now())
        .bind(JobStatus::Ingesting.as_str())
        .bind(JobStatus::Analyzing.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn create_ingest_task(
        &self,
        job_id: Option<i64>,
        file_name: &str,
        provided_file_name: &str,
    ) -> Result<IngestTask> {
        let task = sqlx::query_as::<_, IngestTask>(
            r#"
            INSERT INTO ingest_tasks (job_id, file_name, provided_file_name, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, job_id, file_name, provided_file_name, created_at
            "#,
        )
        .bind(job_id)
        .bind(file_name)
        .bind(provided_file_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(task)
    }

    async fn get_all_ingest_tasks(&self) -> Result<Vec<IngestTask>> {
        let tasks = sqlx::query_as::<_, IngestTask>(
            r#"
            SELECT id, job_id, file_name, provided_file_name, created_at
            FROM ingest_tasks
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    async fn get_ingest_tasks_for_job(&self, job_id: i64) -> Result<Vec<IngestTask>> {
        let tasks = sqlx::query_as::<_, IngestTask>(
            r#"
            SELECT id, job_id, file_name, provided_file_name, created_at
            FROM ingest_tasks
            WHERE job_id = ?
            ORDER BY id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    async fn delete_ingest_task(&self, task_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM ingest_tasks WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_all_ingest_tasks(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ingest_tasks")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn request_analysis(&self, requested_by: &str) -> Result<()> {
        self.insert_request(RequestKind::Analysis, requested_by).await
    }

    async fn has_analysis_request(&self) -> Result<bool> {
        self.has_request(RequestKind::Analysis).await
    }

    async fn delete_analysis_request(&self) -> Result<()> {
        self.delete_request(RequestKind::Analysis).await
    }

    async fn request_graph_data_deletion(&self, requested_by: &str) -> Result<()> {
        self.insert_request(RequestKind::Deletion, requested_by).await
    }

    async fn has_graph_data_deletion_request(&self) -> Result<bool> {
        self.has_request(RequestKind::Deletion).await
    }

    async fn delete_graph_data_deletion_request(&self) -> Result<()> {
        self.delete_request(RequestKind::Deletion).await
    }

    async fn get_flag_by_key(&self, key: &str) -> Result<FeatureFlag> {
        let enabled: Option<bool> =
            sqlx::query_scalar("SELECT enabled FROM feature_flags WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(FeatureFlag {
            key: key.to_string(),
            enabled: enabled.unwrap_or(false),
        })
    }

    async fn set_flag(&self, key: &str, enabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feature_flags (key, enabled, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET enabled = excluded.enabled, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(enabled)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn write_batch(&self, source_file: &str, payload: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO graph_batches (source_file, payload, ingested_at) VALUES (?, ?, ?)",
        )
        .bind(source_file)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_batches(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM graph_batches")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn delete_all_graph_data(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM graph_batches")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
