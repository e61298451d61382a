// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Removal of temp files no queued task refers to.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Filesystem access used by the sweeper.
#[async_trait]
pub trait FileOperations: Send + Sync {
    /// Names of the entries directly inside `path`.
    async fn list_directory(&self, path: &Path) -> std::io::Result<Vec<String>>;

    /// Remove a file, or a directory with everything in it.
    async fn delete_file(&self, path: &Path) -> std::io::Result<()>;
}

/// [`FileOperations`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileOperations;

#[async_trait]
impl FileOperations for OsFileOperations {
    async fn list_directory(&self, path: &Path) -> std::io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn delete_file(&self, path: &Path) -> std::io::Result<()> {
        let metadata = tokio::fs::symlink_metadata(path).await?;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        }
    }
}

/// Deletes temp-directory entries not referenced by any ingest task.
///
/// At most one sweep runs at a time; a call made while another sweep is in
/// flight returns immediately.
pub struct OrphanFileSweeper {
    file_ops: Arc<dyn FileOperations>,
    temp_dir: PathBuf,
    running: Mutex<()>,
}

impl OrphanFileSweeper {
    /// Create a sweeper for `temp_dir`.
    pub fn new(file_ops: Arc<dyn FileOperations>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            file_ops,
            temp_dir: temp_dir.into(),
            running: Mutex::new(()),
        }
    }

    /// Directory being swept.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Remove every entry whose name is not in `expected_file_names`.
    ///
    /// Expected names are compared by their final path component, so full
    /// paths and bare names both work. Cancellation is checked before each
    /// removal. Returns the number of entries removed.
    pub async fn clear(&self, ctx: &CancellationToken, expected_file_names: Vec<String>) -> usize {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Orphan file sweep already in progress, skipping");
            return 0;
        };

        let entries = match self.file_ops.list_directory(&self.temp_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.temp_dir.display(), "Temp directory does not exist, nothing to sweep");
                return 0;
            }
            Err(e) => {
                error!(dir = %self.temp_dir.display(), error = %e, "Failed to list temp directory");
                return 0;
            }
        };

        let expected: HashSet<&str> = expected_file_names
            .iter()
            .filter_map(|name| Path::new(name).file_name()?.to_str())
            .collect();

        let mut removed = 0;
        for name in entries
            .iter()
            .filter(|name| !expected.contains(name.as_str()))
        {
            if ctx.is_cancelled() {
                info!(removed, "Orphan file sweep cancelled");
                return removed;
            }

            let path = self.temp_dir.join(name);
            match self.file_ops.delete_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed orphaned file");
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove orphaned file");
                }
            }
        }

        if removed > 0 {
            info!(removed, dir = %self.temp_dir.display(), "Removed orphaned temp files");
        }
        removed
    }
}
