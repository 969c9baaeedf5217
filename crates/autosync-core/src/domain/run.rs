//! Pipeline and loop outcome records.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plan::PlanAction;
use crate::error::Result;
use crate::persist;

/// Maximum number of characters of runner output kept in a [`PatchResult`].
pub const MESSAGE_LIMIT: usize = 200;

const TRUNCATION_MARKER: &str = "...(truncated)";

/// Outcome of one PATCH item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResult {
    pub module: String,
    pub action: PlanAction,
    pub success: bool,
    pub exit_code: i32,
    pub message: String,
}

impl PatchResult {
    pub fn new(
        module: impl Into<String>,
        action: PlanAction,
        success: bool,
        exit_code: i32,
        message: &str,
    ) -> Self {
        Self {
            module: module.into(),
            action,
            success,
            exit_code,
            message: truncate_message(message),
        }
    }

    pub fn failed(module: impl Into<String>, action: PlanAction, message: &str) -> Self {
        Self::new(module, action, false, -1, message)
    }
}

/// Trim and cap `raw` at [`MESSAGE_LIMIT`] characters (not bytes).
pub fn truncate_message(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(MESSAGE_LIMIT) {
        Some((cut, _)) => format!("{}{}", &trimmed[..cut], TRUNCATION_MARKER),
        None => trimmed.to_string(),
    }
}

/// Final state of one pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Green,
    Red,
    Error,
    NoPlan,
    NoSafeguard,
    Unknown,
}

impl RunState {
    pub fn is_green(self) -> bool {
        self == RunState::Green
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Green => "GREEN",
            RunState::Red => "RED",
            RunState::Error => "ERROR",
            RunState::NoPlan => "NO_PLAN",
            RunState::NoSafeguard => "NO_SAFEGUARD",
            RunState::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Persisted result of one executor run. Each run overwrites the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub state: RunState,
    pub timestamp: DateTime<Utc>,
    pub patch_results: Vec<PatchResult>,
    pub dry_run: bool,
}

impl PipelineRunResult {
    pub fn new(state: RunState, patch_results: Vec<PatchResult>, dry_run: bool) -> Self {
        Self {
            state,
            timestamp: Utc::now(),
            patch_results,
            dry_run,
        }
    }

    /// Number of successful patch results.
    pub fn patched_count(&self) -> usize {
        self.patch_results.iter().filter(|r| r.success).count()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persist::write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        persist::read_json(path)
    }
}

/// Per-iteration record kept by the hybrid loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub loop_index: u32,
    pub patched_count: usize,
    pub state: RunState,
    pub timestamp: DateTime<Utc>,
}
