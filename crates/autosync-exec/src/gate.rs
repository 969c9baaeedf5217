//! Safety gate backed by an external check program, and gate selection.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use autosync_core::{
    AutosyncContext, BuiltinSafetyGate, CommandSpec, GateConfig, GateError, GateOutcome, SafetyGate,
};

use crate::error::ExecError;
use crate::process::run_command;

/// Runs the gate program in check mode; exit 0 is GREEN.
pub struct CommandSafetyGate {
    base_dir: PathBuf,
    command: CommandSpec,
}

impl CommandSafetyGate {
    pub fn new(base_dir: impl Into<PathBuf>, command: CommandSpec) -> Self {
        Self {
            base_dir: base_dir.into(),
            command,
        }
    }
}

#[async_trait]
impl SafetyGate for CommandSafetyGate {
    async fn check(&self) -> Result<GateOutcome, GateError> {
        let result = run_command(&self.command, &self.base_dir, &[])
            .await
            .map_err(|e| match e {
                ExecError::ProgramMissing(path) => GateError::Missing(path.display().to_string()),
                other => GateError::Invocation(other.to_string()),
            })?;

        let details = result
            .output()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        Ok(GateOutcome {
            passed: result.passed(),
            details,
        })
    }
}

/// The gate configured for `ctx`, or `None` when no gate is configured.
pub fn gate_from_context(ctx: &AutosyncContext) -> Option<Arc<dyn SafetyGate>> {
    match ctx.config().safeguard.as_ref()? {
        GateConfig::Builtin => Some(Arc::new(BuiltinSafetyGate::from_context(ctx))),
        GateConfig::Command {
            interpreter,
            script,
            args,
        } => {
            let command = CommandSpec {
                interpreter: interpreter.clone(),
                script: script.clone(),
                args: args.clone(),
            };
            Some(Arc::new(CommandSafetyGate::new(ctx.base_dir(), command)))
        }
    }
}
