//! Plan records exchanged between the plan builder and the pipeline executor.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AutosyncError, Result};
use crate::persist;

/// What the executor should do with one module.
///
/// Strings outside the known set are preserved as [`PlanAction::Other`] so a
/// hand-edited plan still loads; the executor logs and skips them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PlanAction {
    Patch,
    CheckOnly,
    Skip,
    Other(String),
}

impl PlanAction {
    pub fn as_str(&self) -> &str {
        match self {
            PlanAction::Patch => "PATCH",
            PlanAction::CheckOnly => "CHECK_ONLY",
            PlanAction::Skip => "SKIP",
            PlanAction::Other(s) => s,
        }
    }
}

impl From<String> for PlanAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PATCH" => PlanAction::Patch,
            "CHECK_ONLY" => PlanAction::CheckOnly,
            "SKIP" => PlanAction::Skip,
            _ => PlanAction::Other(s),
        }
    }
}

impl From<PlanAction> for String {
    fn from(a: PlanAction) -> Self {
        a.as_str().to_string()
    }
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub module: String,
    pub action: PlanAction,
    pub priority: u32,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub target_version: Option<String>,
}

/// Ordered action plan plus the dependency order it was derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub serial_order: Vec<String>,
    pub items: Vec<PlanItem>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Stable ascending sort by priority.
    pub fn sort(&mut self) {
        self.items.sort_by_key(|item| item.priority);
    }

    /// Drop every item whose module already appeared earlier. Returns the
    /// dropped items so callers can log them.
    pub fn dedup_modules(&mut self) -> Vec<PlanItem> {
        let mut seen = HashSet::new();
        let mut dropped = Vec::new();
        self.items.retain(|item| {
            if seen.insert(item.module.clone()) {
                true
            } else {
                dropped.push(item.clone());
                false
            }
        });
        dropped
    }

    /// Load a plan file. Missing and malformed files are distinct errors.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AutosyncError::PlanMissing(path.to_path_buf()));
        }
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw).map_err(|e| AutosyncError::InvalidPlan {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persist::write_json_atomic(path, self)
    }
}
