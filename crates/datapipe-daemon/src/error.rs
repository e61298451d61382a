// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for datapipe-daemon.

use datapipe_store::StoreError;
use thiserror::Error;

/// Daemon errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Analysis engine failed without classifying its outcome.
    #[error("Analysis error: {0}")]
    Analysis(#[from] crate::analysis::AnalysisError),

    /// Ingesting a task failed.
    #[error("Ingest error: {0}")]
    Ingest(#[from] crate::ingest::IngestError),

    /// A purge step failed; remaining steps were skipped.
    #[error("Purge step '{step}' failed: {source}")]
    PurgeStep {
        /// The step that failed.
        step: &'static str,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using daemon Error.
pub type Result<T> = std::result::Result<T, Error>;
