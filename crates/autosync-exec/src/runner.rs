//! Module runner that executes each module's configured script.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use autosync_core::{AutosyncContext, ModuleConfig, ModuleRunner, PlanItem, RunnerError, RunnerOutput};
use tracing::debug;

use crate::error::ExecError;
use crate::process::run_command;

/// Environment variable carrying the plan item's target version, when set.
pub const TARGET_VERSION_ENV: &str = "AUTOSYNC_TARGET_VERSION";

pub struct ProcessModuleRunner {
    base_dir: PathBuf,
    modules: BTreeMap<String, ModuleConfig>,
}

impl ProcessModuleRunner {
    pub fn new(base_dir: impl Into<PathBuf>, modules: BTreeMap<String, ModuleConfig>) -> Self {
        Self {
            base_dir: base_dir.into(),
            modules,
        }
    }

    pub fn from_context(ctx: &AutosyncContext) -> Self {
        Self::new(ctx.base_dir(), ctx.config().modules.clone())
    }
}

#[async_trait]
impl ModuleRunner for ProcessModuleRunner {
    async fn run(&self, item: &PlanItem) -> Result<RunnerOutput, RunnerError> {
        let config = self
            .modules
            .get(&item.module)
            .ok_or_else(|| RunnerError::ModuleConfigMissing(item.module.clone()))?;

        let mut envs = Vec::new();
        if let Some(version) = &item.target_version {
            envs.push((TARGET_VERSION_ENV, version.as_str()));
        }
        debug!(module = %item.module, script = %config.command.script.display(), "running module");

        let result = run_command(&config.command, &self.base_dir, &envs)
            .await
            .map_err(|e| match e {
                ExecError::ProgramMissing(path) => RunnerError::ScriptMissing {
                    module: item.module.clone(),
                    path,
                },
                other => RunnerError::Invocation {
                    module: item.module.clone(),
                    reason: other.to_string(),
                },
            })?;

        Ok(RunnerOutput {
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}
