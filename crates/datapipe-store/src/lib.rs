// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Datapipe Store - persistence for the ingest and analysis pipeline
//!
//! This crate owns everything the datapipe daemon reads and writes:
//!
//! | Record | Description |
//! |--------|-------------|
//! | Datapipe status | Single process-wide status row used as the full-graph lock |
//! | Ingest jobs | One row per ingestion request, with lifecycle status |
//! | Ingest tasks | One row per uploaded file awaiting ingestion |
//! | Requests | Pending analysis / graph-data deletion signals |
//! | Feature flags | Runtime toggles consulted by the daemon |
//! | Graph batches | Raw payloads written by ingestion |
//!
//! # Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`SqliteStore`] | SQLite via sqlx, schema applied from embedded migrations |
//! | [`MemoryStore`] | In-process store with failure injection (tests, embedding) |
//!
//! # Job Status State Machine
//!
//! ```text
//!      ┌───────────┐   no tasks left   ┌───────────┐
//!      │ INGESTING │──────────────────►│ ANALYZING │
//!      └─────┬─────┘                   └─────┬─────┘
//!            │ ingest timeout          ┌─────┴─────┐
//!            ▼                         ▼           ▼
//!      ┌───────────┐             ┌──────────┐ ┌────────┐
//!      │ TIMED_OUT │             │ COMPLETE │ │ FAILED │
//!      └───────────┘             └──────────┘ └────────┘
//!
//!   INGESTING / ANALYZING ── purge ──► CANCELED
//! ```

#![deny(missing_docs)]

/// Error types for store operations.
pub mod error;

/// Ingest job, task, and status records.
pub mod model;

/// Store traits and backend implementations.
pub mod persistence;

pub use error::StoreError;
pub use model::{
    DatapipeStatus, DatapipeStatusSnapshot, FeatureFlag, IngestJob, IngestTask, JobStatus,
    RequestKind,
};
pub use persistence::{DatapipeStore, GraphStore, MemoryStore, SqliteStore};
