// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Datapipe Daemon - Ingest and Analysis Scheduler

use std::sync::Arc;
use tracing::{info, warn};

use datapipe_daemon::analysis::{Analyzer, CommandAnalyzer, NoopAnalyzer};
use datapipe_daemon::config::Config;
use datapipe_daemon::runtime::DatapipeRuntime;
use datapipe_store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datapipe_daemon=info,datapipe_store=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        database_path = %config.database_path.display(),
        temp_dir = %config.temp_dir.display(),
        tick_interval_secs = config.tick_interval.as_secs(),
        disable_analysis = config.disable_analysis,
        "Starting Datapipe Daemon"
    );

    let store = Arc::new(SqliteStore::from_path(&config.database_path).await?);
    info!("Database ready");

    let analyzer: Arc<dyn Analyzer> = match config
        .analysis_command
        .as_deref()
        .and_then(CommandAnalyzer::from_command_line)
    {
        Some(command) => {
            Arc::new(command.with_partial_exit_code(config.analysis_partial_exit_code))
        }
        None => Arc::new(NoopAnalyzer),
    };
    info!(analyzer_type = analyzer.analyzer_type(), "Analyzer initialized");

    let runtime = DatapipeRuntime::builder()
        .store(store.clone())
        .graph(store)
        .analyzer(analyzer)
        .tick_interval(config.tick_interval)
        .temp_dir(&config.temp_dir)
        .disable_analysis(config.disable_analysis)
        .ingest_timeout(config.ingest_timeout)
        .build()?
        .start()
        .await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Datapipe Daemon shut down");

    Ok(())
}
