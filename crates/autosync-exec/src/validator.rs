//! Source validator that shells out to configured syntax and simulate commands.

use std::path::Path;
use std::process::Command;

use autosync_core::patch::Issue;
use autosync_core::{SourceValidator, ValidatorConfig};

/// Placeholder replaced by the file under validation.
pub const PATH_PLACEHOLDER: &str = "{path}";

pub struct CommandValidator {
    config: ValidatorConfig,
}

impl CommandValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    fn run(&self, argv: &[String], path: &Path) -> Result<(), String> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };
        let file = path.display().to_string();
        let args: Vec<String> = args
            .iter()
            .map(|a| a.replace(PATH_PLACEHOLDER, &file))
            .collect();

        let output = Command::new(program)
            .args(&args)
            .output()
            .map_err(|e| format!("failed to run {program}: {e}"))?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = if stderr.trim().is_empty() { stdout } else { stderr };
        let last = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or("validator exited with failure");
        Err(last.to_string())
    }
}

/// First `line N` mention in a diagnostic, if any.
fn line_hint(message: &str) -> Option<usize> {
    let idx = message.find("line ")?;
    let digits: String = message[idx + 5..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

impl SourceValidator for CommandValidator {
    fn name(&self) -> &str {
        "command"
    }

    fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.config.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }

    fn syntax_issues(&self, path: &Path, _text: &str) -> Vec<Issue> {
        match self.run(&self.config.syntax, path) {
            Ok(()) => Vec::new(),
            Err(message) if message.starts_with("failed to run") => vec![Issue::Compile(message)],
            Err(message) => {
                let line = line_hint(&message);
                vec![Issue::Syntax { message, line }]
            }
        }
    }

    fn simulate(&self, path: &Path) -> Result<(), String> {
        self.run(&self.config.simulate, path)
    }
}
