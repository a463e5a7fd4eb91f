// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;
use std::process::Command;

use crate::error::{PrepError, Result};

/// What to do when the converter exits with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    #[default]
    Error,
    /// Log the failure and carry on, the run still counts as complete.
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Converted,
    FailedIgnored(String),
    DryRun,
}

/// Runs `program [args..] <archive> <output>` and waits for it.
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    program: String,
    args: Vec<String>,
    on_failure: OnFailure,
    dry_run: bool,
}

impl ExternalConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: vec![], on_failure: OnFailure::Error, dry_run: false }
    }

    /// Arguments inserted before the two positional paths, e.g.
    /// `run --bin=convert-tensor --` when `program` is `cargo`.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn command(&self, archive: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(archive).arg(output);
        cmd
    }

    pub fn convert(&self, archive: &Path, output: &Path) -> Result<Outcome> {
        let mut cmd = self.command(archive, output);
        if self.dry_run {
            tracing::info!(?cmd, "dry-run, converter not executed");
            return Ok(Outcome::DryRun);
        }
        tracing::info!(?cmd, "running converter");
        let status = match cmd.status() {
            Ok(status) if status.success() => {
                tracing::info!(?output, "converted");
                return Ok(Outcome::Converted);
            }
            Ok(status) => status.to_string(),
            Err(e) => format!("could not be started: {e}"),
        };
        match self.on_failure {
            OnFailure::Error => Err(PrepError::Conversion { program: self.program.clone(), status }),
            OnFailure::Warn => {
                tracing::warn!(program = %self.program, %status, "converter failed, ignoring");
                Ok(Outcome::FailedIgnored(status))
            }
        }
    }
}
