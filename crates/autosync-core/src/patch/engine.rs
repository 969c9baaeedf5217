//! The patch pipeline: sandbox, edit, validate, simulate, back up, apply.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::backup;
use super::danger::{DangerSignature, DEFAULT_SIGNATURES};
use super::edit::{EditSettings, Intent};
use super::error::PatchResult;
use super::validate::{inspect, Issue, JsonValidator, SandboxValidation, SourceValidator, ValidationStatus};
use crate::context::AutosyncContext;
use crate::metrics::METRICS;
use crate::{obs, persist};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub module: String,
    #[serde(flatten)]
    pub intent: Intent,
}

/// Terminal state of one patch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchOutcome {
    Applied { edits: Vec<String>, backup: PathBuf },
    Block { issues: Vec<Issue> },
    Error { issues: Vec<String> },
    #[serde(rename = "NOCHANGE")]
    NoChange,
    Skip,
}

impl PatchOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            PatchOutcome::Applied { .. } => "APPLIED",
            PatchOutcome::Block { .. } => "BLOCK",
            PatchOutcome::Error { .. } => "ERROR",
            PatchOutcome::NoChange => "NOCHANGE",
            PatchOutcome::Skip => "SKIP",
        }
    }
}

pub struct PatchEngine {
    targets: BTreeMap<String, PathBuf>,
    settings: EditSettings,
    validators: Vec<Box<dyn SourceValidator>>,
    signatures: Vec<DangerSignature>,
    sandbox_root: PathBuf,
    backups_dir: PathBuf,
}

impl PatchEngine {
    pub fn new(
        targets: BTreeMap<String, PathBuf>,
        settings: EditSettings,
        sandbox_root: PathBuf,
        backups_dir: PathBuf,
    ) -> Self {
        Self {
            targets,
            settings,
            validators: vec![Box::new(JsonValidator)],
            signatures: DEFAULT_SIGNATURES.to_vec(),
            sandbox_root,
            backups_dir,
        }
    }

    pub fn from_context(ctx: &AutosyncContext) -> PatchResult<Self> {
        let patch = &ctx.config().patch;
        let targets = patch
            .targets
            .iter()
            .map(|(module, path)| (module.clone(), ctx.resolve(path)))
            .collect();
        Ok(Self::new(
            targets,
            EditSettings::from_config(patch)?,
            ctx.sandbox_dir(),
            ctx.backups_dir(),
        ))
    }

    /// Register a validator; later registrations take precedence.
    pub fn with_validator(mut self, validator: Box<dyn SourceValidator>) -> Self {
        self.validators.insert(0, validator);
        self
    }

    pub fn signatures(&self) -> &[DangerSignature] {
        &self.signatures
    }

    pub(crate) fn validator_for(&self, path: &Path) -> Option<&dyn SourceValidator> {
        self.validators
            .iter()
            .find(|v| v.handles(path))
            .map(|v| v.as_ref())
    }

    /// Run one request to a terminal state. `Err` is reserved for I/O failures
    /// outside the sandbox (backup, apply).
    pub fn apply(&self, request: &PatchRequest) -> PatchResult<PatchOutcome> {
        let outcome = self.apply_inner(request)?;
        let detail = match &outcome {
            PatchOutcome::Applied { edits, .. } => edits.join("; "),
            PatchOutcome::Block { issues } => {
                METRICS.inc_patches_blocked();
                issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; ")
            }
            PatchOutcome::Error { issues } => issues.join("; "),
            PatchOutcome::NoChange | PatchOutcome::Skip => String::new(),
        };
        obs::emit_patch_outcome(&request.module, outcome.status(), &detail);
        Ok(outcome)
    }

    fn apply_inner(&self, request: &PatchRequest) -> PatchResult<PatchOutcome> {
        let Some(target) = self.targets.get(&request.module) else {
            info!(module = %request.module, "module not in patch allow-list");
            return Ok(PatchOutcome::Skip);
        };
        if !target.is_file() {
            return Ok(PatchOutcome::Error {
                issues: vec![format!("target file not found: {}", target.display())],
            });
        }

        let edits = request.intent.edits();
        if edits.is_empty() {
            return Ok(PatchOutcome::NoChange);
        }

        fs::create_dir_all(&self.sandbox_root)?;
        let sandbox = tempfile::Builder::new()
            .prefix("patch-")
            .tempdir_in(&self.sandbox_root)?;
        let file_name = target
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("target"));
        let staged = sandbox.path().join(file_name);
        fs::copy(target, &staged)?;

        let original = match fs::read_to_string(&staged) {
            Ok(text) => text,
            Err(e) => {
                return Ok(PatchOutcome::Error {
                    issues: vec![Issue::Read(e.to_string()).to_string()],
                })
            }
        };
        let (patched, applied) = match self.settings.apply(&original, &edits) {
            Ok(result) => result,
            Err(reason) => return Ok(PatchOutcome::Error { issues: vec![reason] }),
        };
        if patched == original {
            return Ok(PatchOutcome::NoChange);
        }
        fs::write(&staged, &patched)?;

        let validator = self.validator_for(&staged);
        let mut issues = inspect(&staged, validator, &self.signatures);
        // Unvalidated content never reaches the target.
        let Some(validator) = validator else {
            let extension = staged
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            warn!(module = %request.module, extension = %extension, "no validator for patched file");
            issues.push(Issue::NoValidator { extension });
            return Ok(PatchOutcome::Block { issues });
        };
        let validation = SandboxValidation::from_issues(issues);
        if validation.status != ValidationStatus::Safe {
            warn!(module = %request.module, issues = validation.issues.len(), "sandbox validation rejected patch");
            return Ok(PatchOutcome::Block {
                issues: validation.issues,
            });
        }

        if let Err(reason) = validator.simulate(&staged) {
            warn!(module = %request.module, validator = validator.name(), "simulation failed");
            return Ok(PatchOutcome::Block {
                issues: vec![Issue::Simulation(reason)],
            });
        }

        let backup = backup::create(target, &self.backups_dir)?;
        persist::write_bytes_atomic(target, patched.as_bytes())?;
        info!(
            module = %request.module,
            target = %target.display(),
            backup = %backup.path.display(),
            "patch applied"
        );

        Ok(PatchOutcome::Applied {
            edits: applied,
            backup: backup.path,
        })
    }
}
