// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory store.
//!
//! Holds all records in process memory. Besides embedding, it is the store
//! used by the daemon's tests: it counts job updates and can be told to fail
//! individual operations (by trait method name) or updates of specific jobs.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::model::{
    DatapipeStatus, DatapipeStatusSnapshot, FeatureFlag, IngestJob, IngestTask, JobStatus,
    RequestKind,
};

use super::{CANCELED_BY_PURGE_MESSAGE, DatapipeStore, GraphStore};

#[derive(Debug)]
struct MemoryState {
    status: DatapipeStatusSnapshot,
    jobs: BTreeMap<i64, IngestJob>,
    tasks: BTreeMap<i64, IngestTask>,
    requests: HashMap<RequestKind, String>,
    flags: HashMap<String, bool>,
    batches: Vec<(String, String)>,
    next_job_id: i64,
    next_task_id: i64,
    update_job_calls: usize,
    failing_operations: HashSet<String>,
    failing_job_updates: HashSet<i64>,
}

/// In-memory store with failure injection.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with an `Idle` status.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                status: DatapipeStatusSnapshot {
                    status: DatapipeStatus::Idle,
                    partial: false,
                    updated_at: Utc::now(),
                    last_complete_analysis_at: None,
                },
                jobs: BTreeMap::new(),
                tasks: BTreeMap::new(),
                requests: HashMap::new(),
                flags: HashMap::new(),
                batches: Vec::new(),
                next_job_id: 1,
                next_task_id: 1,
                update_job_calls: 0,
                failing_operations: HashSet::new(),
                failing_job_updates: HashSet::new(),
            }),
        }
    }

    /// Make every call to `operation` (a trait method name) fail.
    pub async fn fail_operation(&self, operation: &str) {
        self.state
            .lock()
            .await
            .failing_operations
            .insert(operation.to_string());
    }

    /// Make `update_ingest_job` fail for one job only.
    pub async fn fail_job_update(&self, job_id: i64) {
        self.state.lock().await.failing_job_updates.insert(job_id);
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.failing_operations.clear();
        state.failing_job_updates.clear();
    }

    /// Number of `update_ingest_job` calls seen, including failed ones.
    pub async fn update_ingest_job_calls(&self) -> usize {
        self.state.lock().await.update_job_calls
    }

    /// Insert a job with an arbitrary status, bypassing the update counter.
    pub async fn insert_ingest_job(&self, status: JobStatus) -> IngestJob {
        self.state.lock().await.insert_job(status, None)
    }
}

impl MemoryState {
    fn insert_job(&mut self, status: JobStatus, user_id: Option<&str>) -> IngestJob {
        let now = Utc::now();
        let job = IngestJob {
            id: self.next_job_id,
            user_id: user_id.map(str::to_string),
            status,
            status_message: String::new(),
            start_time: now,
            end_time: None,
            last_ingest: now,
            total_files: 0,
            failed_files: 0,
        };
        self.next_job_id += 1;
        self.jobs.insert(job.id, job.clone());
        job
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing_operations.contains(operation) {
            return Err(StoreError::Simulated(operation.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DatapipeStore for MemoryStore {
    async fn get_datapipe_status(&self) -> Result<DatapipeStatusSnapshot> {
        let state = self.state.lock().await;
        state.check("get_datapipe_status")?;
        Ok(state.status.clone())
    }

    async fn set_datapipe_status(&self, status: DatapipeStatus, partial: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("set_datapipe_status")?;

        let now = Utc::now();
        if state.status.status == DatapipeStatus::Analyzing && status == DatapipeStatus::Idle {
            state.status.last_complete_analysis_at = Some(now);
        }
        state.status.status = status;
        state.status.partial = partial;
        state.status.updated_at = now;
        Ok(())
    }

    async fn set_datapipe_status_if_idle(&self, status: DatapipeStatus) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.check("set_datapipe_status_if_idle")?;

        if state.status.status != DatapipeStatus::Idle {
            return Ok(false);
        }
        state.status.status = status;
        state.status.updated_at = Utc::now();
        Ok(true)
    }

    async fn create_ingest_job(&self, user_id: Option<&str>) -> Result<IngestJob> {
        let mut state = self.state.lock().await;
        state.check("create_ingest_job")?;
        Ok(state.insert_job(JobStatus::Ingesting, user_id))
    }

    async fn get_ingest_job(&self, job_id: i64) -> Result<Option<IngestJob>> {
        let state = self.state.lock().await;
        state.check("get_ingest_job")?;
        Ok(state.jobs.get(&job_id).cloned())
    }

    async fn get_ingest_jobs_with_status(&self, status: JobStatus) -> Result<Vec<IngestJob>> {
        let state = self.state.lock().await;
        state.check("get_ingest_jobs_with_status")?;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }

    async fn update_ingest_job(&self, job: &IngestJob) -> Result<()> {
        let mut state = self.state.lock().await;
        state.update_job_calls += 1;
        state.check("update_ingest_job")?;

        if state.failing_job_updates.contains(&job.id) {
            return Err(StoreError::Simulated(format!("update_ingest_job({})", job.id)));
        }

        match state.jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(StoreError::JobNotFound(job.id)),
        }
    }

    async fn cancel_all_ingest_jobs(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.check("cancel_all_ingest_jobs")?;

        let now = Utc::now();
        let mut canceled = 0;
        for job in state.jobs.values_mut() {
            if !job.status.is_terminal() {
                job.transition(JobStatus::Canceled, now);
                job.status_message = CANCELED_BY_PURGE_MESSAGE.to_string();
                canceled += 1;
            }
        }
        Ok(canceled)
    }

    async fn create_ingest_task(
        &self,
        job_id: Option<i64>,
        file_name: &str,
        provided_file_name: &str,
    ) -> Result<IngestTask> {
        let mut state = self.state.lock().await;
        state.check("create_ingest_task")?;

        let task = IngestTask {
            id: state.next_task_id,
            job_id,
            file_name: file_name.to_string(),
            provided_file_name: provided_file_name.to_string(),
            created_at: Utc::now(),
        };
        state.next_task_id += 1;
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_all_ingest_tasks(&self) -> Result<Vec<IngestTask>> {
        let state = self.state.lock().await;
        state.check("get_all_ingest_tasks")?;
        Ok(state.tasks.values().cloned().collect())
    }

    async fn get_ingest_tasks_for_job(&self, job_id: i64) -> Result<Vec<IngestTask>> {
        let state = self.state.lock().await;
        state.check("get_ingest_tasks_for_job")?;
        Ok(state
            .tasks
            .values()
            .filter(|task| task.job_id == Some(job_id))
            .cloned()
            .collect())
    }

    async fn delete_ingest_task(&self, task_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("delete_ingest_task")?;
        state.tasks.remove(&task_id);
        Ok(())
    }

    async fn delete_all_ingest_tasks(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.check("delete_all_ingest_tasks")?;
        let deleted = state.tasks.len() as u64;
        state.tasks.clear();
        Ok(deleted)
    }

    async fn request_analysis(&self, requested_by: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("request_analysis")?;
        state
            .requests
            .entry(RequestKind::Analysis)
            .or_insert_with(|| requested_by.to_string());
        Ok(())
    }

    async fn has_analysis_request(&self) -> Result<bool> {
        let state = self.state.lock().await;
        state.check("has_analysis_request")?;
        Ok(state.requests.contains_key(&RequestKind::Analysis))
    }

    async fn delete_analysis_request(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("delete_analysis_request")?;
        state.requests.remove(&RequestKind::Analysis);
        Ok(())
    }

    async fn request_graph_data_deletion(&self, requested_by: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("request_graph_data_deletion")?;
        state
            .requests
            .entry(RequestKind::Deletion)
            .or_insert_with(|| requested_by.to_string());
        Ok(())
    }

    async fn has_graph_data_deletion_request(&self) -> Result<bool> {
        let state = self.state.lock().await;
        state.check("has_graph_data_deletion_request")?;
        Ok(state.requests.contains_key(&RequestKind::Deletion))
    }

    async fn delete_graph_data_deletion_request(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("delete_graph_data_deletion_request")?;
        state.requests.remove(&RequestKind::Deletion);
        Ok(())
    }

    async fn get_flag_by_key(&self, key: &str) -> Result<FeatureFlag> {
        let state = self.state.lock().await;
        state.check("get_flag_by_key")?;
        Ok(FeatureFlag {
            key: key.to_string(),
            enabled: state.flags.get(key).copied().unwrap_or(false),
        })
    }

    async fn set_flag(&self, key: &str, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("set_flag")?;
        state.flags.insert(key.to_string(), enabled);
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn write_batch(&self, source_file: &str, payload: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("write_batch")?;
        state
            .batches
            .push((source_file.to_string(), payload.to_string()));
        Ok(())
    }

    async fn count_batches(&self) -> Result<u64> {
        let state = self.state.lock().await;
        state.check("count_batches")?;
        Ok(state.batches.len() as u64)
    }

    async fn delete_all_graph_data(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.check("delete_all_graph_data")?;
        let deleted = state.batches.len() as u64;
        state.batches.clear();
        Ok(deleted)
    }
}
