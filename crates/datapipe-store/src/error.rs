// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for datapipe-store.

use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted value could not be interpreted.
    #[error("Invalid {field} value: '{value}'")]
    InvalidValue {
        /// Column or field holding the value.
        field: &'static str,
        /// The raw value that was read.
        value: String,
    },

    /// Ingest job was not found.
    #[error("Ingest job {0} not found")]
    JobNotFound(i64),

    /// Failure injected into a [`MemoryStore`](crate::MemoryStore).
    #[error("Simulated failure in {0}")]
    Simulated(String),
}

/// Result type using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;
