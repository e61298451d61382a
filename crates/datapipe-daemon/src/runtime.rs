// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for the datapipe daemon.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use datapipe_daemon::analysis::NoopAnalyzer;
//! use datapipe_daemon::runtime::DatapipeRuntime;
//! use datapipe_store::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteStore::from_path(".data/datapipe.db").await?);
//!
//!     let runtime = DatapipeRuntime::builder()
//!         .store(store.clone())
//!         .graph(store)
//!         .analyzer(Arc::new(NoopAnalyzer))
//!         .temp_dir(".data/tmp")
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use datapipe_store::{DatapipeStore, GraphStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::analysis::Analyzer;
use crate::cache::{MemoryCache, ResultCache};
use crate::daemon::{Collaborators, Daemon, DaemonConfig};
use crate::ingest::{
    DEFAULT_INGEST_TIMEOUT, FileIngestor, IngestProcessor, IngestTimeoutMonitor, StaleJobProcessor,
};
use crate::orphans::{FileOperations, OsFileOperations};

/// Builder for creating a [`DatapipeRuntime`].
pub struct DatapipeRuntimeBuilder {
    store: Option<Arc<dyn DatapipeStore>>,
    graph: Option<Arc<dyn GraphStore>>,
    analyzer: Option<Arc<dyn Analyzer>>,
    ingestor: Option<Arc<dyn IngestProcessor>>,
    stale_jobs: Option<Arc<dyn StaleJobProcessor>>,
    cache: Option<Arc<dyn ResultCache>>,
    file_ops: Option<Arc<dyn FileOperations>>,
    tick_interval: Duration,
    temp_dir: PathBuf,
    disable_analysis: bool,
    ingest_timeout: Duration,
}

impl Default for DatapipeRuntimeBuilder {
    fn default() -> Self {
        let defaults = DaemonConfig::default();
        Self {
            store: None,
            graph: None,
            analyzer: None,
            ingestor: None,
            stale_jobs: None,
            cache: None,
            file_ops: None,
            tick_interval: defaults.tick_interval,
            temp_dir: defaults.temp_dir,
            disable_analysis: defaults.disable_analysis,
            ingest_timeout: DEFAULT_INGEST_TIMEOUT,
        }
    }
}

impl DatapipeRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the datapipe store (required).
    pub fn store(mut self, store: Arc<dyn DatapipeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the graph store (required).
    pub fn graph(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Set the analysis engine (required).
    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Override the ingest processor.
    ///
    /// Default: [`FileIngestor`] writing to the graph store
    pub fn ingestor(mut self, ingestor: Arc<dyn IngestProcessor>) -> Self {
        self.ingestor = Some(ingestor);
        self
    }

    /// Override the stale job processor.
    ///
    /// Default: [`IngestTimeoutMonitor`] with the configured ingest timeout
    pub fn stale_jobs(mut self, stale_jobs: Arc<dyn StaleJobProcessor>) -> Self {
        self.stale_jobs = Some(stale_jobs);
        self
    }

    /// Override the result cache.
    ///
    /// Default: a fresh [`MemoryCache`]
    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Override filesystem access for the orphan sweep.
    pub fn file_ops(mut self, file_ops: Arc<dyn FileOperations>) -> Self {
        self.file_ops = Some(file_ops);
        self
    }

    /// Set the tick interval.
    ///
    /// Default: 5 seconds
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the temp directory holding uploads.
    ///
    /// Default: `.data/tmp`
    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = path.into();
        self
    }

    /// Skip graph analysis.
    pub fn disable_analysis(mut self, disabled: bool) -> Self {
        self.disable_analysis = disabled;
        self
    }

    /// Set the inactivity timeout for ingesting jobs.
    ///
    /// Default: 20 minutes
    pub fn ingest_timeout(mut self, timeout: Duration) -> Self {
        self.ingest_timeout = timeout;
        self
    }

    /// Build the runtime configuration.
    pub fn build(self) -> Result<DatapipeRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let graph = self
            .graph
            .ok_or_else(|| anyhow::anyhow!("graph is required"))?;
        let analyzer = self
            .analyzer
            .ok_or_else(|| anyhow::anyhow!("analyzer is required"))?;
        if self.tick_interval.is_zero() {
            anyhow::bail!("tick_interval must be greater than zero");
        }

        let ingestor = self
            .ingestor
            .unwrap_or_else(|| Arc::new(FileIngestor::new(graph.clone())));
        let stale_jobs = self.stale_jobs.unwrap_or_else(|| {
            Arc::new(IngestTimeoutMonitor::new(store.clone(), self.ingest_timeout))
        });
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new()));
        let file_ops = self.file_ops.unwrap_or_else(|| Arc::new(OsFileOperations));

        Ok(DatapipeRuntimeConfig {
            collaborators: Collaborators {
                store,
                graph,
                analyzer,
                ingestor,
                stale_jobs,
                cache,
                file_ops,
            },
            config: DaemonConfig {
                tick_interval: self.tick_interval,
                temp_dir: self.temp_dir,
                disable_analysis: self.disable_analysis,
            },
        })
    }
}

/// Validated configuration ready to start.
pub struct DatapipeRuntimeConfig {
    collaborators: Collaborators,
    config: DaemonConfig,
}

impl DatapipeRuntimeConfig {
    /// Create the temp directory and spawn the daemon loop.
    pub async fn start(self) -> Result<DatapipeRuntime> {
        tokio::fs::create_dir_all(&self.config.temp_dir).await?;

        let temp_dir = self.config.temp_dir.clone();
        let daemon = Arc::new(Daemon::new(self.collaborators, self.config));
        let shutdown = CancellationToken::new();

        let handle = {
            let daemon = daemon.clone();
            let ctx = shutdown.clone();
            tokio::spawn(async move { daemon.start(ctx).await })
        };

        info!(temp_dir = %temp_dir.display(), "DatapipeRuntime started");

        Ok(DatapipeRuntime {
            daemon,
            handle,
            shutdown,
        })
    }
}

/// A running datapipe daemon.
pub struct DatapipeRuntime {
    daemon: Arc<Daemon>,
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl DatapipeRuntime {
    /// Create a builder.
    pub fn builder() -> DatapipeRuntimeBuilder {
        DatapipeRuntimeBuilder::new()
    }

    /// The running daemon.
    pub fn daemon(&self) -> &Arc<Daemon> {
        &self.daemon
    }

    /// Stop the daemon and wait for the current tick to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("DatapipeRuntime shutting down...");

        self.shutdown.cancel();
        self.daemon.stop();

        match self.handle.await {
            Ok(()) => {
                info!("DatapipeRuntime shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Datapipe daemon task panicked: {}", e);
                Err(anyhow::anyhow!("daemon task panicked: {}", e))
            }
        }
    }

    /// Check if the daemon loop is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
