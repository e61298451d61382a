// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Analyzer that shells out to an external command.
//!
//! The exit status is the contract:
//!
//! | Exit | Outcome |
//! |------|---------|
//! | `0` | [`AnalysisOutcome::Success`] |
//! | partial exit code (default `2`) | [`AnalysisOutcome::PartialFailure`] |
//! | anything else | [`AnalysisOutcome::TotalFailure`] |
//!
//! A command that cannot be spawned or dies from a signal yields an
//! [`AnalysisError`].

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::traits::*;

/// Default exit code signalling partial failure.
pub const DEFAULT_PARTIAL_EXIT_CODE: i32 = 2;

/// Runs analysis as a child process.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    partial_exit_code: i32,
}

impl CommandAnalyzer {
    /// Create an analyzer for `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            partial_exit_code: DEFAULT_PARTIAL_EXIT_CODE,
        }
    }

    /// Build from a whitespace separated command line.
    ///
    /// Returns `None` for a blank line. No shell quoting is interpreted.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    /// Override the exit code that means partial failure.
    pub fn with_partial_exit_code(mut self, code: i32) -> Self {
        self.partial_exit_code = code;
        self
    }

    /// Program that will be executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    fn classify(&self, code: Option<i32>, stderr: &[u8]) -> Result<AnalysisOutcome> {
        match code {
            Some(0) => Ok(AnalysisOutcome::Success),
            Some(code) if code == self.partial_exit_code => {
                warn!(
                    exit_code = code,
                    stderr = %String::from_utf8_lossy(stderr).trim(),
                    "Analysis completed with partial failures"
                );
                Ok(AnalysisOutcome::PartialFailure)
            }
            Some(code) => {
                warn!(
                    exit_code = code,
                    stderr = %String::from_utf8_lossy(stderr).trim(),
                    "Analysis command failed"
                );
                Ok(AnalysisOutcome::TotalFailure)
            }
            None => Err(AnalysisError::Terminated),
        }
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    fn analyzer_type(&self) -> &'static str {
        "command"
    }

    async fn run(&self) -> Result<AnalysisOutcome> {
        debug!(program = %self.program, args = ?self.args, "Spawning analysis command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await?;

        self.classify(output.status.code(), &output.stderr)
    }
}
