// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Datapipe Daemon - Ingest and Analysis Scheduler
//!
//! A single background loop that moves uploaded files into the graph,
//! triggers graph analysis, executes operator-requested purges, and keeps
//! the upload temp directory clean.
//!
//! # Architecture
//!
//! ```text
//!   Upload API                 Operator API
//!  (queues tasks)       (analysis / deletion requests)
//!        │                          │
//!        ▼                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   datapipe-store                         │
//! │  status row │ ingest jobs │ ingest tasks │ requests      │
//! └─────────────────────────────────────────────────────────┘
//!        ▲
//!        │ every tick
//! ┌─────────────────────────────────────────────────────────┐
//! │                datapipe-daemon (This Crate)              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐        │
//! │  │  Purge  │→│ Ingest  │→│  Jobs   │→│ Analysis │        │
//! │  └─────────┘ └─────────┘ └─────────┘ └──────────┘        │
//! │  ┌─────────────────────┐ (startup + every 24h, detached) │
//! │  │ Orphan file sweeper │                                 │
//! │  └─────────────────────┘                                 │
//! └─────────────────────────────────────────────────────────┘
//!        │                   │                    │
//!        ▼                   ▼                    ▼
//!   Graph store        Analysis engine       Result cache
//! ```
//!
//! Full-graph operations (ingest, analysis, purge) are serialized through
//! the datapipe status: each one takes it with a compare-and-set from
//! `idle` and always hands it back.
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DATAPIPE_DATABASE_PATH` | `.data/datapipe.db` | SQLite database file |
//! | `DATAPIPE_TEMP_DIR` | `.data/tmp` | Upload temp directory |
//! | `DATAPIPE_TICK_INTERVAL_SECS` | `5` | Pause between ticks |
//! | `DATAPIPE_DISABLE_ANALYSIS` | `false` | Skip graph analysis |
//! | `DATAPIPE_ANALYSIS_COMMAND` | - | Analysis command; unset always succeeds |
//! | `DATAPIPE_ANALYSIS_PARTIAL_EXIT_CODE` | `2` | Exit code meaning partial failure |
//! | `DATAPIPE_INGEST_TIMEOUT_SECS` | `1200` | Inactivity before a job times out |

#![deny(missing_docs)]

/// Graph analysis engines and the analysis orchestrator.
pub mod analysis;

/// Result cache reset after analysis.
pub mod cache;

/// Configuration loaded from environment variables.
pub mod config;

/// The scheduler loop.
pub mod daemon;

/// Error types for daemon operations.
pub mod error;

/// Ingest intake and stale-job handling.
pub mod ingest;

/// Ingest job lifecycle transitions.
pub mod jobs;

/// Orphaned temp file sweeping.
pub mod orphans;

/// Graph data purge.
pub mod purge;

/// Embeddable runtime.
pub mod runtime;

pub use daemon::{Collaborators, Daemon, DaemonConfig};
pub use error::{Error, Result};
pub use runtime::DatapipeRuntime;
