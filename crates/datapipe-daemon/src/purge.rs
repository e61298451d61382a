// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Graph data purge.

use std::sync::Arc;
use std::time::Instant;

use datapipe_store::{DatapipeStatus, DatapipeStore, GraphStore};
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Requester recorded on the analysis request raised after a purge.
pub const PURGE_REQUESTER: &str = "datapipe";

/// Deletes all graph data on request.
pub struct PurgeOrchestrator {
    db: Arc<dyn DatapipeStore>,
    graph: Arc<dyn GraphStore>,
}

impl PurgeOrchestrator {
    /// Create an orchestrator.
    pub fn new(db: Arc<dyn DatapipeStore>, graph: Arc<dyn GraphStore>) -> Self {
        Self { db, graph }
    }

    /// Purge all ingested data.
    ///
    /// When another operation holds the datapipe status nothing is touched
    /// and the deletion request stays pending for the next tick. Otherwise
    /// the status is released, the deletion request cleared, and an analysis
    /// requested, even when a purge step failed. Returns whether the purge
    /// ran.
    pub async fn purge_graph_data(&self) -> bool {
        match self
            .db
            .set_datapipe_status_if_idle(DatapipeStatus::Purging)
            .await
        {
            Ok(true) => {
                let started = Instant::now();
                info!("Purging graph data");
                match self.purge_steps().await {
                    Ok(()) => info!(
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Graph data purge completed"
                    ),
                    Err(e) => error!(
                        duration_ms = started.elapsed().as_millis() as u64,
                        error = %e,
                        "Graph data purge failed"
                    ),
                }
            }
            Ok(false) => {
                warn!("Datapipe busy, deferring graph data purge");
                return false;
            }
            Err(e) => {
                error!(error = %e, "Failed to set datapipe status to purging");
            }
        }

        self.finish().await;
        true
    }

    async fn purge_steps(&self) -> Result<()> {
        let canceled = self
            .db
            .cancel_all_ingest_jobs()
            .await
            .map_err(|source| Error::PurgeStep {
                step: "cancel ingest jobs",
                source,
            })?;
        info!(count = canceled, "Canceled ingest jobs");

        let deleted = self
            .db
            .delete_all_ingest_tasks()
            .await
            .map_err(|source| Error::PurgeStep {
                step: "delete ingest tasks",
                source,
            })?;
        info!(count = deleted, "Deleted ingest tasks");

        let batches = self
            .graph
            .delete_all_graph_data()
            .await
            .map_err(|source| Error::PurgeStep {
                step: "delete graph data",
                source,
            })?;
        info!(count = batches, "Deleted graph data");

        Ok(())
    }

    async fn finish(&self) {
        if let Err(e) = self
            .db
            .set_datapipe_status(DatapipeStatus::Idle, false)
            .await
        {
            error!(error = %e, "Failed to reset datapipe status after purge");
        }

        if let Err(e) = self.db.delete_graph_data_deletion_request().await {
            error!(error = %e, "Failed to clear graph data deletion request");
        }

        if let Err(e) = self.db.request_analysis(PURGE_REQUESTER).await {
            error!(error = %e, "Failed to request analysis after purge");
        }
    }
}
