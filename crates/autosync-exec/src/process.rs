//! Subprocess execution shared by runners, gates and deploy stages.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use autosync_core::CommandSpec;
use tokio::process::Command;

use crate::error::ExecError;

/// Captured result of one subprocess.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (0 = success, -1 if terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout, or stderr when stdout is blank.
    pub fn output(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Run `[interpreter] script args...` from `base_dir`.
///
/// Relative scripts resolve against `base_dir`. A script that does not exist
/// is reported as [`ExecError::ProgramMissing`] before anything is spawned.
pub async fn run_command(
    spec: &CommandSpec,
    base_dir: &Path,
    envs: &[(&str, &str)],
) -> Result<CommandResult, ExecError> {
    let start = Instant::now();
    let script = if spec.script.is_absolute() {
        spec.script.clone()
    } else {
        base_dir.join(&spec.script)
    };
    if !script.exists() {
        return Err(ExecError::ProgramMissing(script));
    }

    let mut cmd = match &spec.interpreter {
        Some(interpreter) => {
            let mut c = Command::new(interpreter);
            c.arg(&script);
            c
        }
        None => Command::new(&script),
    };
    cmd.args(&spec.args)
        .current_dir(base_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let program = spec
        .interpreter
        .clone()
        .unwrap_or_else(|| script.display().to_string());
    let output = cmd
        .output()
        .await
        .map_err(|source| ExecError::Spawn { program, source })?;

    Ok(CommandResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_falls_back_to_stderr() {
        let result = CommandResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "boom".to_string(),
            duration_ms: 3,
        };
        assert!(!result.passed());
        assert_eq!(result.output(), "boom");
    }

    #[tokio::test]
    async fn missing_script_is_not_spawned() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("nope.sh").with_interpreter("sh");
        let err = run_command(&spec, dir.path(), &[]).await.unwrap_err();
        assert!(matches!(err, ExecError::ProgramMissing(_)));
    }

    #[tokio::test]
    async fn runs_script_through_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("echo.sh"), "echo \"$1 $AUTOSYNC_TEST\"\n").unwrap();
        let spec = CommandSpec::new("echo.sh")
            .with_interpreter("sh")
            .with_args(["hello"]);

        let result = run_command(&spec, dir.path(), &[("AUTOSYNC_TEST", "world")])
            .await
            .unwrap();
        assert!(result.passed());
        assert_eq!(result.stdout.trim(), "hello world");
    }
}
