// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Graph analysis.
//!
//! The [`Analyzer`] trait is the seam to the analysis engine; the
//! [`AnalysisOrchestrator`] decides when it may run and what its outcome
//! means for waiting ingest jobs.

mod command;
mod mock;
mod noop;
mod orchestrator;
mod traits;

pub use command::CommandAnalyzer;
pub use mock::MockAnalyzer;
pub use noop::NoopAnalyzer;
pub use orchestrator::{AnalysisOrchestrator, ENTITY_PANEL_CACHE_FLAG};
pub use traits::*;
