//! Validation of sandboxed files: typed issues, injected validators, verdicts.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::danger::{self, DangerSignature};

/// One problem found in a file. Serialized as its display string
/// (`SYNTAX_ERROR:...`, `DANGEROUS_PATTERN:...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    Syntax { message: String, line: Option<usize> },
    Compile(String),
    Simulation(String),
    Danger { pattern: String },
    FileNotFound,
    Read(String),
    /// No registered validator handles this file extension.
    NoValidator { extension: String },
}

impl Issue {
    pub fn is_dangerous(&self) -> bool {
        matches!(self, Issue::Danger { .. })
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::Syntax {
                message,
                line: Some(line),
            } => write!(f, "SYNTAX_ERROR:{message} at line {line}"),
            Issue::Syntax { message, line: None } => write!(f, "SYNTAX_ERROR:{message}"),
            Issue::Compile(msg) => write!(f, "COMPILE_ERROR:{msg}"),
            Issue::Simulation(msg) => write!(f, "SIMULATION_FAILED:{msg}"),
            Issue::Danger { pattern } => write!(f, "DANGEROUS_PATTERN:{pattern}"),
            Issue::FileNotFound => f.write_str("FILE_NOT_FOUND"),
            Issue::Read(msg) => write!(f, "READ_ERROR:{msg}"),
            Issue::NoValidator { extension } => write!(f, "NO_VALIDATOR:{extension}"),
        }
    }
}

impl Serialize for Issue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Safe,
    Warn,
    Block,
}

/// Verdict for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxValidation {
    pub status: ValidationStatus,
    pub issues: Vec<Issue>,
}

impl SandboxValidation {
    /// SAFE without issues, BLOCK on any danger signature, WARN otherwise.
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let status = if issues.is_empty() {
            ValidationStatus::Safe
        } else if issues.iter().any(Issue::is_dangerous) {
            ValidationStatus::Block
        } else {
            ValidationStatus::Warn
        };
        Self { status, issues }
    }
}

/// Injected syntax and simulate capability for one family of files.
pub trait SourceValidator: Send + Sync {
    fn name(&self) -> &str;

    fn handles(&self, path: &Path) -> bool;

    /// Fast syntax check. Empty means the file parses.
    fn syntax_issues(&self, path: &Path, text: &str) -> Vec<Issue>;

    /// Stricter independent build/compile pass.
    fn simulate(&self, path: &Path) -> Result<(), String>;
}

/// Collect read, danger and syntax issues for `path`.
pub fn inspect(
    path: &Path,
    validator: Option<&dyn SourceValidator>,
    signatures: &[DangerSignature],
) -> Vec<Issue> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return vec![Issue::FileNotFound],
        Err(e) => return vec![Issue::Read(e.to_string())],
    };

    let mut issues = Vec::new();
    if let Some(v) = validator {
        issues.extend(v.syntax_issues(path, &text));
    }
    issues.extend(danger::scan(&text, signatures).into_iter().map(|s| Issue::Danger {
        pattern: s.pattern.to_string(),
    }));
    issues
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Built-in validator for `.json` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValidator;

impl SourceValidator for JsonValidator {
    fn name(&self) -> &str {
        "json"
    }

    fn handles(&self, path: &Path) -> bool {
        has_extension(path, "json")
    }

    fn syntax_issues(&self, _path: &Path, text: &str) -> Vec<Issue> {
        match serde_json::from_str::<Value>(text) {
            Ok(_) => Vec::new(),
            Err(e) => vec![Issue::Syntax {
                message: e.to_string(),
                line: Some(e.line()),
            }],
        }
    }

    /// Configs must decode from disk as a top-level object.
    fn simulate(&self, path: &Path) -> Result<(), String> {
        let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(_)) => Ok(()),
            Ok(_) => Err("top-level value is not an object".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}
