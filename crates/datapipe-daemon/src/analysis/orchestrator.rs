// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runs one analysis pass and applies its outcome.

use std::sync::Arc;
use std::time::Instant;

use datapipe_store::{DatapipeStatus, DatapipeStore};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::traits::{AnalysisOutcome, Analyzer};
use crate::cache::ResultCache;
use crate::jobs::{complete_analyzed_ingest_jobs, fail_analyzed_ingest_jobs};

/// Feature flag whose changes trigger a cache reset after successful analysis.
pub const ENTITY_PANEL_CACHE_FLAG: &str = "entity_panel_cache";

/// Coordinates analysis with the datapipe status and ingest jobs.
pub struct AnalysisOrchestrator {
    db: Arc<dyn DatapipeStore>,
    analyzer: Arc<dyn Analyzer>,
    cache: Arc<dyn ResultCache>,
    analysis_disabled: bool,
    /// Flag value seen after the last successful analysis; `None` until the first one.
    last_cache_flag: Mutex<Option<bool>>,
}

impl AnalysisOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        db: Arc<dyn DatapipeStore>,
        analyzer: Arc<dyn Analyzer>,
        cache: Arc<dyn ResultCache>,
        analysis_disabled: bool,
    ) -> Self {
        Self {
            db,
            analyzer,
            cache,
            analysis_disabled,
            last_cache_flag: Mutex::new(None),
        }
    }

    /// Run analysis if the datapipe is idle.
    ///
    /// The analysis request is cleared before anything else, so a request
    /// made while analysis is disabled or the datapipe is busy is consumed.
    /// Returns the outcome, or `None` when analysis did not run.
    pub async fn run_analysis(&self) -> Option<AnalysisOutcome> {
        if let Err(e) = self.db.delete_analysis_request().await {
            error!(error = %e, "Failed to clear analysis request");
            return None;
        }

        if self.analysis_disabled {
            debug!("Analysis disabled, skipping");
            return None;
        }

        match self
            .db
            .set_datapipe_status_if_idle(DatapipeStatus::Analyzing)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!("Datapipe busy, skipping analysis");
                return None;
            }
            Err(e) => {
                error!(error = %e, "Failed to set datapipe status to analyzing");
                return None;
            }
        }

        let started = Instant::now();
        info!(analyzer = self.analyzer.analyzer_type(), "Graph analysis started");

        let outcome = match self.analyzer.run().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Graph analysis failed");
                AnalysisOutcome::TotalFailure
            }
        };

        info!(
            outcome = ?outcome,
            duration_ms = started.elapsed().as_millis() as u64,
            "Graph analysis finished"
        );

        let partial = match outcome {
            AnalysisOutcome::TotalFailure => {
                fail_analyzed_ingest_jobs(self.db.as_ref()).await;
                false
            }
            AnalysisOutcome::PartialFailure => {
                complete_analyzed_ingest_jobs(self.db.as_ref()).await;
                true
            }
            AnalysisOutcome::Success => {
                complete_analyzed_ingest_jobs(self.db.as_ref()).await;
                self.reset_cache_if_flag_changed().await;
                false
            }
        };

        if let Err(e) = self
            .db
            .set_datapipe_status(DatapipeStatus::Idle, partial)
            .await
        {
            error!(error = %e, "Failed to set datapipe status to idle after analysis");
        }

        Some(outcome)
    }

    async fn reset_cache_if_flag_changed(&self) {
        let flag = match self.db.get_flag_by_key(ENTITY_PANEL_CACHE_FLAG).await {
            Ok(flag) => flag,
            Err(e) => {
                error!(error = %e, flag = ENTITY_PANEL_CACHE_FLAG, "Failed to read cache feature flag");
                return;
            }
        };

        let mut last = self.last_cache_flag.lock().await;
        if *last == Some(flag.enabled) {
            debug!(enabled = flag.enabled, "Cache feature flag unchanged");
            return;
        }
        *last = Some(flag.enabled);

        match self.cache.reset().await {
            Ok(()) => info!(enabled = flag.enabled, "Result cache reset after analysis"),
            Err(e) => error!(error = %e, "Failed to reset result cache"),
        }
    }
}
