// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Analyzer used when no analysis engine is configured.

use async_trait::async_trait;

use super::traits::*;

/// Reports success without doing any work.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnalyzer;

#[async_trait]
impl Analyzer for NoopAnalyzer {
    fn analyzer_type(&self) -> &'static str {
        "noop"
    }

    async fn run(&self) -> Result<AnalysisOutcome> {
        Ok(AnalysisOutcome::Success)
    }
}
