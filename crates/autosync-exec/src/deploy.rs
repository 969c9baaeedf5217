//! Deploy chain: structure diff, re-validation, then named stages in order.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use autosync_core::domain::run::truncate_message;
use autosync_core::structure;
use autosync_core::{
    prune_snapshot, AutosyncContext, DeployChain, DeployError, DeployOutcome, SafetyGate,
    StageConfig,
};
use tracing::{info, warn};

use crate::error::ExecError;
use crate::process::run_command;

pub struct StagedDeployChain {
    base_dir: PathBuf,
    stages: Vec<StageConfig>,
    exclude: Vec<String>,
    snapshot_path: PathBuf,
    gate: Option<Arc<dyn SafetyGate>>,
}

impl StagedDeployChain {
    pub fn new(base_dir: impl Into<PathBuf>, stages: Vec<StageConfig>, snapshot_path: PathBuf) -> Self {
        Self {
            base_dir: base_dir.into(),
            stages,
            exclude: Vec::new(),
            snapshot_path,
            gate: None,
        }
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Re-run `gate` before the first stage; anything but GREEN blocks the deploy.
    pub fn with_gate(mut self, gate: Arc<dyn SafetyGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn from_context(ctx: &AutosyncContext, gate: Option<Arc<dyn SafetyGate>>) -> Self {
        let deploy = &ctx.config().deploy;
        let chain = Self::new(ctx.base_dir(), deploy.stages.clone(), ctx.snapshot_path())
            .with_exclude(deploy.exclude.clone());
        match gate {
            Some(gate) if deploy.revalidate => chain.with_gate(gate),
            _ => chain,
        }
    }
}

#[async_trait]
impl DeployChain for StagedDeployChain {
    async fn deploy(&self) -> Result<DeployOutcome, DeployError> {
        let (previous, stale) = prune_snapshot(structure::load(&self.snapshot_path)?, &self.base_dir);
        for issue in &stale {
            warn!(issue = %issue, "stale structure snapshot entry dropped");
        }
        let current = structure::scan(&self.base_dir, &self.exclude)?;
        let diff = structure::diff(&previous, &current);
        if diff.is_empty() {
            info!("structure unchanged; deploy skipped");
            return Ok(DeployOutcome::NoChange);
        }
        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            modified = diff.modified.len(),
            "structure changed"
        );

        if let Some(gate) = &self.gate {
            match gate.check().await {
                Ok(outcome) if outcome.passed => {}
                Ok(outcome) => {
                    return Ok(DeployOutcome::Blocked {
                        reason: format!("re-validation failed: {}", outcome.details.join("; ")),
                    })
                }
                Err(e) => {
                    return Ok(DeployOutcome::Blocked {
                        reason: e.to_string(),
                    })
                }
            }
        }

        let mut ran = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            info!(stage = %stage.name, "deploy stage starting");
            let result = run_command(&stage.command, &self.base_dir, &[])
                .await
                .map_err(|e| DeployError::Invocation {
                    stage: stage.name.clone(),
                    reason: match e {
                        ExecError::ProgramMissing(path) => format!("not found: {}", path.display()),
                        other => other.to_string(),
                    },
                })?;
            if !result.passed() {
                return Err(DeployError::StageFailed {
                    stage: stage.name.clone(),
                    exit_code: result.exit_code,
                    output: truncate_message(result.output()),
                });
            }
            info!(stage = %stage.name, duration_ms = result.duration_ms, "deploy stage finished");
            ran.push(stage.name.clone());
        }

        // rescan so files written by the stages count as the new baseline
        let after = structure::scan(&self.base_dir, &self.exclude)?;
        structure::save(&self.snapshot_path, &after)?;
        Ok(DeployOutcome::Deployed { stages: ran })
    }
}
