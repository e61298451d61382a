// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Analyzer trait definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified result of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Every analysis step completed.
    Success,
    /// Some steps failed; the graph is usable but incomplete.
    PartialFailure,
    /// Analysis failed outright.
    TotalFailure,
}

/// Errors an analyzer returns when it cannot classify its own outcome.
///
/// The orchestrator treats all of them as [`AnalysisOutcome::TotalFailure`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnalysisError {
    /// The analysis process could not be started.
    #[error("Failed to start analysis: {0}")]
    Spawn(#[from] std::io::Error),

    /// The analysis process was killed by a signal.
    #[error("Analysis terminated by signal")]
    Terminated,

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for analyzer operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// The analysis engine.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Short name used in logs.
    fn analyzer_type(&self) -> &'static str;

    /// Run a full-graph analysis to completion.
    async fn run(&self) -> Result<AnalysisOutcome>;
}
