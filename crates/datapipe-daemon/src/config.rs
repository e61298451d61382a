// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for datapipe-daemon.

use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file holding the status row, jobs, tasks, and requests
    pub database_path: PathBuf,
    /// Directory where uploaded files wait for ingestion
    pub temp_dir: PathBuf,
    /// Time between the end of one tick and the start of the next
    pub tick_interval: Duration,
    /// Skip graph analysis entirely (requests are still cleared)
    pub disable_analysis: bool,
    /// External analysis command; `None` means analysis always succeeds immediately
    pub analysis_command: Option<String>,
    /// Exit code of the analysis command that signals a partial failure
    pub analysis_partial_exit_code: i32,
    /// Ingesting jobs without activity for this long are timed out
    pub ingest_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = PathBuf::from(
            std::env::var("DATAPIPE_DATABASE_PATH")
                .unwrap_or_else(|_| ".data/datapipe.db".to_string()),
        );

        let temp_dir = PathBuf::from(
            std::env::var("DATAPIPE_TEMP_DIR").unwrap_or_else(|_| ".data/tmp".to_string()),
        );

        let tick_secs: u64 = parse_var("DATAPIPE_TICK_INTERVAL_SECS", 5)?;
        if tick_secs == 0 {
            return Err(ConfigError::Invalid(
                "DATAPIPE_TICK_INTERVAL_SECS",
                "must be greater than zero".to_string(),
            ));
        }

        let disable_analysis = std::env::var("DATAPIPE_DISABLE_ANALYSIS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let analysis_command = std::env::var("DATAPIPE_ANALYSIS_COMMAND")
            .ok()
            .filter(|cmd| !cmd.trim().is_empty());

        let analysis_partial_exit_code: i32 = parse_var("DATAPIPE_ANALYSIS_PARTIAL_EXIT_CODE", 2)?;

        let ingest_timeout_secs: u64 = parse_var("DATAPIPE_INGEST_TIMEOUT_SECS", 20 * 60)?;

        Ok(Self {
            database_path,
            temp_dir,
            tick_interval: Duration::from_secs(tick_secs),
            disable_analysis,
            analysis_command,
            analysis_partial_exit_code,
            ingest_timeout: Duration::from_secs(ingest_timeout_secs),
        })
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, format!("'{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be used.
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
