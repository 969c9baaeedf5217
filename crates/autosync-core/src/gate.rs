//! Safety gate: an independent full-system health check after patching.
//!
//! [`SafetyGate`] is the seam the pipeline consults. [`BuiltinSafetyGate`]
//! performs the file, field and directory checks in-process and can export a
//! JSON report; a command-backed gate lives in `autosync-exec`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::AutosyncContext;
use crate::domain::RunState;
use crate::error::Result;
use crate::{obs, persist};

/// Fields every status entry must carry.
pub const REQUIRED_STATUS_FIELDS: [&str; 2] = ["current_version", "health"];
/// Status fields whose absence is logged but not fatal.
pub const OPTIONAL_STATUS_FIELDS: [&str; 1] = ["target_version"];
/// Fields every plan item must carry.
pub const REQUIRED_ITEM_FIELDS: [&str; 3] = ["module", "action", "priority"];

/// Result of a gate invocation that actually ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub passed: bool,
    pub details: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No gate configured, or its program does not exist.
    #[error("safety gate missing: {0}")]
    Missing(String),

    #[error("safety gate invocation failed: {0}")]
    Invocation(String),
}

#[async_trait]
pub trait SafetyGate: Send + Sync {
    async fn check(&self) -> std::result::Result<GateOutcome, GateError>;
}

/// Map a gate invocation onto the pipeline state.
pub fn state_from_gate(result: &std::result::Result<GateOutcome, GateError>) -> RunState {
    match result {
        Ok(outcome) if outcome.passed => RunState::Green,
        Ok(_) => RunState::Red,
        Err(GateError::Missing(_)) => RunState::NoSafeguard,
        Err(GateError::Invocation(_)) => RunState::Error,
    }
}

/// One sub-check of the builtin gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl GateCheck {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Full report of one builtin gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateReport {
    pub state: RunState,
    pub checks: Vec<GateCheck>,
    pub warnings: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl GateReport {
    pub fn failures(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Write `safeguard_report_<YYYYmmdd_HHMMSS>.json` into `reports_dir`.
    pub fn export(&self, reports_dir: &Path) -> Result<PathBuf> {
        let ts = Local::now().format("%Y%m%d_%H%M%S");
        let path = reports_dir.join(format!("safeguard_report_{ts}.json"));
        persist::write_json_atomic(&path, self)?;
        tracing::info!(path = %path.display(), "safeguard report exported");
        Ok(path)
    }
}

/// In-process gate over the status file, the plan file and module directories.
#[derive(Debug, Clone)]
pub struct BuiltinSafetyGate {
    status_path: PathBuf,
    plan_path: PathBuf,
    module_dirs: Vec<(String, PathBuf)>,
}

impl BuiltinSafetyGate {
    pub fn new(status_path: PathBuf, plan_path: PathBuf, module_dirs: Vec<(String, PathBuf)>) -> Self {
        Self {
            status_path,
            plan_path,
            module_dirs,
        }
    }

    pub fn from_context(ctx: &AutosyncContext) -> Self {
        Self::new(ctx.status_path(), ctx.plan_path(), ctx.module_dirs())
    }

    /// Run every sub-check once. Any failure makes the report RED.
    pub fn evaluate(&self) -> GateReport {
        let mut checks = Vec::new();
        let mut warnings = Vec::new();

        match load_json("status", &self.status_path, &mut checks) {
            Some(Value::Object(entries)) => {
                checks.push(GateCheck::pass("status.shape", "status file is an object"));
                for (module, entry) in &entries {
                    for field in REQUIRED_STATUS_FIELDS {
                        if entry.get(field).is_none() {
                            checks.push(GateCheck::fail(
                                format!("status.{module}.{field}"),
                                format!("{module} missing field {field}"),
                            ));
                        }
                    }
                    for field in OPTIONAL_STATUS_FIELDS {
                        if entry.get(field).is_none() {
                            warnings.push(format!("{module} missing field {field}"));
                        }
                    }
                }
            }
            Some(_) => checks.push(GateCheck::fail("status.shape", "status file is not an object")),
            None => {}
        }

        if let Some(plan) = load_json("plan", &self.plan_path, &mut checks) {
            check_plan_fields(&plan, &mut checks);
        }

        for (module, dir) in &self.module_dirs {
            let name = format!("module_dir.{module}");
            if dir.is_dir() {
                checks.push(GateCheck::pass(name, dir.display().to_string()));
            } else {
                checks.push(GateCheck::fail(name, format!("missing directory {}", dir.display())));
            }
        }

        for failed in checks.iter().filter(|c| !c.passed) {
            obs::emit_gate_check_failed(&failed.name, &failed.detail);
        }
        for warning in &warnings {
            tracing::warn!(event = "gate.check_warning", detail = %warning);
        }

        let state = if checks.iter().all(|c| c.passed) {
            RunState::Green
        } else {
            RunState::Red
        };
        obs::emit_gate_evaluated(state);

        GateReport {
            state,
            checks,
            warnings,
            checked_at: Utc::now(),
        }
    }
}

fn load_json(label: &str, path: &Path, checks: &mut Vec<GateCheck>) -> Option<Value> {
    if !path.exists() {
        checks.push(GateCheck::fail(
            format!("{label}.exists"),
            format!("not found: {}", path.display()),
        ));
        return None;
    }
    checks.push(GateCheck::pass(format!("{label}.exists"), path.display().to_string()));

    let parsed = std::fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => {
            checks.push(GateCheck::pass(format!("{label}.parse"), "valid JSON"));
            Some(value)
        }
        Err(e) => {
            checks.push(GateCheck::fail(format!("{label}.parse"), e));
            None
        }
    }
}

fn check_plan_fields(plan: &Value, checks: &mut Vec<GateCheck>) {
    for field in ["serial_order", "items"] {
        if plan.get(field).is_none() {
            checks.push(GateCheck::fail(
                format!("plan.{field}"),
                format!("plan missing field {field}"),
            ));
        }
    }
    let Some(items) = plan.get("items").and_then(Value::as_array) else {
        return;
    };
    for (idx, item) in items.iter().enumerate() {
        for field in REQUIRED_ITEM_FIELDS {
            if item.get(field).is_none() {
                checks.push(GateCheck::fail(
                    format!("plan.items[{idx}].{field}"),
                    format!("plan item {idx} missing field {field}"),
                ));
            }
        }
    }
}

#[async_trait]
impl SafetyGate for BuiltinSafetyGate {
    async fn check(&self) -> std::result::Result<GateOutcome, GateError> {
        let report = self.evaluate();
        Ok(GateOutcome {
            passed: report.state.is_green(),
            details: report.failures().map(|c| c.detail.clone()).collect(),
        })
    }
}
