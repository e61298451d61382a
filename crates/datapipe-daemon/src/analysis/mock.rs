// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock analyzer for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::*;

/// Analyzer returning a fixed result and counting its runs.
pub struct MockAnalyzer {
    outcome: std::result::Result<AnalysisOutcome, String>,
    runs: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Optional delay to simulate analysis time
    pub execution_delay: Duration,
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self::succeeding()
    }
}

impl MockAnalyzer {
    fn with_result(outcome: std::result::Result<AnalysisOutcome, String>) -> Self {
        Self {
            outcome,
            runs: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            execution_delay: Duration::ZERO,
        }
    }

    /// Every run succeeds.
    pub fn succeeding() -> Self {
        Self::with_result(Ok(AnalysisOutcome::Success))
    }

    /// Every run reports partial failure.
    pub fn partially_failing() -> Self {
        Self::with_result(Ok(AnalysisOutcome::PartialFailure))
    }

    /// Every run reports total failure.
    pub fn failing() -> Self {
        Self::with_result(Ok(AnalysisOutcome::TotalFailure))
    }

    /// Every run returns an unclassified error.
    pub fn erroring(message: impl Into<String>) -> Self {
        Self::with_result(Err(message.into()))
    }

    /// Number of times `run` was called.
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Highest number of runs observed executing at the same time.
    pub fn max_concurrent_runs(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    fn analyzer_type(&self) -> &'static str {
        "mock"
    }

    async fn run(&self) -> Result<AnalysisOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.execution_delay.is_zero() {
            tokio::time::sleep(self.execution_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.outcome.clone().map_err(AnalysisError::Other)
    }
}
