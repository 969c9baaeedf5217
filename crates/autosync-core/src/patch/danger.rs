//! Danger signatures: substrings that block a patch outright.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerCategory {
    ShellExecution,
    DynamicEvaluation,
    SystemFileAccess,
    DestructiveCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DangerSignature {
    pub pattern: &'static str,
    pub category: DangerCategory,
}

pub const DEFAULT_SIGNATURES: &[DangerSignature] = &[
    DangerSignature {
        pattern: "os.system(",
        category: DangerCategory::ShellExecution,
    },
    DangerSignature {
        pattern: "subprocess.Popen",
        category: DangerCategory::ShellExecution,
    },
    DangerSignature {
        pattern: "subprocess.call",
        category: DangerCategory::ShellExecution,
    },
    DangerSignature {
        pattern: "eval(",
        category: DangerCategory::DynamicEvaluation,
    },
    DangerSignature {
        pattern: "exec(",
        category: DangerCategory::DynamicEvaluation,
    },
    DangerSignature {
        pattern: "open('/etc",
        category: DangerCategory::SystemFileAccess,
    },
    DangerSignature {
        pattern: "rm -rf",
        category: DangerCategory::DestructiveCommand,
    },
];

/// Every signature contained in `text`, in table order.
pub fn scan<'a>(text: &str, signatures: &'a [DangerSignature]) -> Vec<&'a DangerSignature> {
    signatures.iter().filter(|s| text.contains(s.pattern)).collect()
}
