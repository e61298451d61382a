// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Result cache that is invalidated after analysis.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

/// Cache errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The cache backend could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Cache of query results derived from the graph.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Drop every cached entry.
    async fn reset(&self) -> Result<(), CacheError>;
}

/// In-process cache keyed by string.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached value.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    /// Store a value, replacing any previous one.
    pub async fn put(&self, key: impl Into<String>, value: Value) {
        self.entries.write().await.insert(key.into(), value);
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn reset(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
