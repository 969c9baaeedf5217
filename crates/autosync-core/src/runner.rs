//! Module runner seam: how one PATCH item is executed.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::PlanItem;

/// Captured result of one module invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOutput {
    /// Exit code (0 = success, -1 when the process was killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunnerOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Text kept in the patch result: stdout, or stderr when stdout is blank.
    pub fn summary(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Item-level runner failures. These become failed patch results and never
/// stop sibling items.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("no module config for {0}")]
    ModuleConfigMissing(String),

    #[error("script for {module} not found: {path}")]
    ScriptMissing { module: String, path: PathBuf },

    #[error("failed to invoke runner for {module}: {reason}")]
    Invocation { module: String, reason: String },
}

#[async_trait]
pub trait ModuleRunner: Send + Sync {
    async fn run(&self, item: &PlanItem) -> Result<RunnerOutput, RunnerError>;
}
