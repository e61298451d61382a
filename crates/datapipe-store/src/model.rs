// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Records persisted by the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Lifecycle status of an ingest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Files for the job are still being uploaded or ingested.
    Ingesting,
    /// All files are ingested; waiting for (or undergoing) graph analysis.
    Analyzing,
    /// Analysis finished and the job's data is reflected in the graph.
    Complete,
    /// Analysis failed.
    Failed,
    /// Canceled by a graph data purge.
    Canceled,
    /// No ingest activity was observed within the ingest timeout.
    TimedOut,
}

impl JobStatus {
    /// Text stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingesting => "ingesting",
            Self::Analyzing => "analyzing",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::TimedOut => "timed_out",
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Canceled | Self::TimedOut
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingesting" => Ok(Self::Ingesting),
            "analyzing" => Ok(Self::Analyzing),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            "timed_out" => Ok(Self::TimedOut),
            other => Err(StoreError::InvalidValue {
                field: "ingest_jobs.status",
                value: other.to_string(),
            }),
        }
    }
}

/// Process-wide datapipe status.
///
/// Anything other than `Idle` means a full-graph operation holds the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatapipeStatus {
    /// No operation in progress.
    Idle,
    /// Queued ingest tasks are being consumed.
    Ingesting,
    /// Graph analysis is running.
    Analyzing,
    /// Graph data is being deleted.
    Purging,
}

impl DatapipeStatus {
    /// Text stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ingesting => "ingesting",
            Self::Analyzing => "analyzing",
            Self::Purging => "purging",
        }
    }
}

impl fmt::Display for DatapipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatapipeStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "ingesting" => Ok(Self::Ingesting),
            "analyzing" => Ok(Self::Analyzing),
            "purging" => Ok(Self::Purging),
            other => Err(StoreError::InvalidValue {
                field: "datapipe_status.status",
                value: other.to_string(),
            }),
        }
    }
}

/// Current value of the datapipe status row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatapipeStatusSnapshot {
    /// Current status.
    pub status: DatapipeStatus,
    /// Whether the last analysis only partially completed.
    pub partial: bool,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
    /// When the status last moved from `Analyzing` to `Idle`.
    pub last_complete_analysis_at: Option<DateTime<Utc>>,
}

/// An ingestion request aggregating one or more uploaded files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestJob {
    /// Database primary key.
    pub id: i64,
    /// User that started the upload, if known.
    pub user_id: Option<String>,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Human-readable detail about the current status.
    pub status_message: String,
    /// When the job was created.
    pub start_time: DateTime<Utc>,
    /// When the job reached a terminal status.
    pub end_time: Option<DateTime<Utc>>,
    /// Last time a file belonging to the job was ingested (or the job was created).
    pub last_ingest: DateTime<Utc>,
    /// Files consumed so far.
    pub total_files: i32,
    /// Files whose ingestion failed.
    pub failed_files: i32,
}

impl IngestJob {
    /// Move the job to `status`, stamping `end_time` for terminal statuses.
    pub fn transition(&mut self, status: JobStatus, now: DateTime<Utc>) {
        self.status = status;
        if status.is_terminal() {
            self.end_time = Some(now);
        }
    }
}

/// One uploaded file awaiting ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IngestTask {
    /// Database primary key.
    pub id: i64,
    /// Owning job, if the file was uploaded as part of one.
    pub job_id: Option<i64>,
    /// Path of the file in temp storage.
    pub file_name: String,
    /// Name supplied by the uploader.
    pub provided_file_name: String,
    /// When the task was queued.
    pub created_at: DateTime<Utc>,
}

/// A runtime feature toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Flag key.
    pub key: String,
    /// Whether the flag is on.
    pub enabled: bool,
}

/// Kind of pending operator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Re-run graph analysis.
    Analysis,
    /// Delete all ingested graph data.
    Deletion,
}

impl RequestKind {
    /// Text stored in the `request_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Deletion => "deletion",
        }
    }
}
