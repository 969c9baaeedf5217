//! Read-only guard: the validation step over arbitrary files.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::engine::PatchEngine;
use super::validate::{inspect, Issue, SandboxValidation, ValidationStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardResult {
    pub path: PathBuf,
    /// Owning module, when the path lies under a configured module directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub status: ValidationStatus,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuardSummary {
    pub total: usize,
    pub safe: usize,
    pub warn: usize,
    pub block: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardReport {
    pub results: Vec<GuardResult>,
    pub summary: GuardSummary,
}

/// Module whose directory is the longest prefix of `path`.
fn owning_module(path: &Path, module_dirs: &[(String, PathBuf)]) -> Option<String> {
    module_dirs
        .iter()
        .filter(|(_, dir)| path.starts_with(dir))
        .max_by_key(|(_, dir)| dir.components().count())
        .map(|(name, _)| name.clone())
}

impl PatchEngine {
    /// Inspect `paths` without modifying anything.
    pub fn guard(&self, paths: &[PathBuf], module_dirs: &[(String, PathBuf)]) -> GuardReport {
        let mut summary = GuardSummary::default();
        let results = paths
            .iter()
            .map(|path| {
                let issues = inspect(path, self.validator_for(path), self.signatures());
                let verdict = SandboxValidation::from_issues(issues);
                summary.total += 1;
                match verdict.status {
                    ValidationStatus::Safe => summary.safe += 1,
                    ValidationStatus::Warn => summary.warn += 1,
                    ValidationStatus::Block => summary.block += 1,
                }
                GuardResult {
                    path: path.clone(),
                    module: owning_module(path, module_dirs),
                    status: verdict.status,
                    issues: verdict.issues,
                }
            })
            .collect();
        GuardReport { results, summary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_module_dirs_pick_the_deepest() {
        let dirs = vec![
            ("AutoSync".to_string(), PathBuf::from("/srv/a")),
            ("Patches".to_string(), PathBuf::from("/srv/a/patches")),
        ];
        assert_eq!(
            owning_module(Path::new("/srv/a/patches/x.py"), &dirs).as_deref(),
            Some("Patches")
        );
        assert_eq!(
            owning_module(Path::new("/srv/a/core.py"), &dirs).as_deref(),
            Some("AutoSync")
        );
        assert_eq!(owning_module(Path::new("/tmp/x.py"), &dirs), None);
    }
}
