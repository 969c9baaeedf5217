//! Self-healing for persisted JSON state.
//!
//! - unparseable, non-object or missing files are reset to their defaults
//! - objects missing required keys get exactly those keys filled in
//! - snapshot entries pointing at deleted files are pruned
//! - an unparseable structure snapshot is reset to empty

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::context::AutosyncContext;
use crate::error::{AutosyncError, Result};
use crate::persist;
use crate::structure::{self, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealAction {
    /// File replaced with the full defaults.
    Reset,
    /// Only these keys were added.
    FilledKeys { keys: Vec<String> },
    Untouched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealRecord {
    pub path: PathBuf,
    pub action: HealAction,
}

impl HealRecord {
    /// Short issue code, or `None` when nothing changed.
    pub fn issue(&self) -> Option<String> {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match &self.action {
            HealAction::Reset => Some(format!("JSON_PARSE_FIXED:{name}")),
            HealAction::FilledKeys { .. } => Some(format!("JSON_FIELDS_FIXED:{name}")),
            HealAction::Untouched => None,
        }
    }
}

/// Repair `path` against `defaults`.
pub fn heal_json_file(path: &Path, defaults: &Map<String, Value>) -> Result<HealAction> {
    let parsed = std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok());

    let Some(Value::Object(mut data)) = parsed else {
        persist::write_json_atomic(path, defaults)?;
        warn!(path = %path.display(), "state file unreadable; reset to defaults");
        return Ok(HealAction::Reset);
    };

    let missing: Vec<String> = defaults
        .keys()
        .filter(|k| !data.contains_key(*k))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(HealAction::Untouched);
    }

    for key in &missing {
        if let Some(value) = defaults.get(key) {
            data.insert(key.clone(), value.clone());
        }
    }
    persist::write_json_atomic(path, &data)?;
    info!(path = %path.display(), keys = ?missing, "filled missing state keys");
    Ok(HealAction::FilledKeys { keys: missing })
}

/// Heal every state file configured under `healing.files`.
pub fn heal_configured(ctx: &AutosyncContext) -> Result<Vec<HealRecord>> {
    ctx.config()
        .healing
        .files
        .iter()
        .map(|target| {
            let path = ctx.resolve(&target.path);
            let action = heal_json_file(&path, &target.defaults)?;
            Ok(HealRecord { path, action })
        })
        .collect()
}

/// Drop entries whose file no longer exists under `base`.
///
/// Returns the pruned map and one `SNAPSHOT_MISSING_FILE:<rel>` issue per drop.
pub fn prune_snapshot<T>(
    snapshot: BTreeMap<String, T>,
    base: &Path,
) -> (BTreeMap<String, T>, Vec<String>) {
    let mut issues = Vec::new();
    let cleaned = snapshot
        .into_iter()
        .filter(|(rel, _)| {
            let keep = base.join(rel).exists();
            if !keep {
                issues.push(format!("SNAPSHOT_MISSING_FILE:{rel}"));
            }
            keep
        })
        .collect();
    (cleaned, issues)
}

/// Repair the structure snapshot at `path` in place.
///
/// A corrupt snapshot is reset to empty with a `SNAPSHOT_RESET:<file>` issue;
/// otherwise stale entries are pruned as in [`prune_snapshot`].
pub fn heal_snapshot(path: &Path, base: &Path) -> Result<Vec<String>> {
    let snapshot = match structure::load(path) {
        Ok(snapshot) => snapshot,
        Err(AutosyncError::Serialization(e)) => {
            warn!(path = %path.display(), error = %e, "structure snapshot unreadable; reset");
            structure::save(path, &Snapshot::new())?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            return Ok(vec![format!("SNAPSHOT_RESET:{name}")]);
        }
        Err(e) => return Err(e),
    };

    let (pruned, stale) = prune_snapshot(snapshot, base);
    if !stale.is_empty() {
        structure::save(path, &pruned)?;
        info!(path = %path.display(), dropped = stale.len(), "pruned structure snapshot");
    }
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> Map<String, Value> {
        match json!({"enabled": true, "mode": "normal", "random_seed": 42}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn unparseable_file_is_reset_to_exact_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SCH_settings.json");
        std::fs::write(&path, "{ nope").unwrap();

        assert_eq!(heal_json_file(&path, &defaults()).unwrap(), HealAction::Reset);
        let back: Value = persist::read_json(&path).unwrap();
        assert_eq!(back, Value::Object(defaults()));
    }

    #[test]
    fn non_object_json_is_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert_eq!(heal_json_file(&path, &defaults()).unwrap(), HealAction::Reset);
    }

    #[test]
    fn only_missing_keys_are_filled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SCH_settings.json");
        std::fs::write(&path, r#"{"enabled": false, "mode": "fast"}"#).unwrap();

        let action = heal_json_file(&path, &defaults()).unwrap();
        assert_eq!(
            action,
            HealAction::FilledKeys {
                keys: vec!["random_seed".to_string()]
            }
        );
        let back: Value = persist::read_json(&path).unwrap();
        assert_eq!(back, json!({"enabled": false, "mode": "fast", "random_seed": 42}));
    }

    #[test]
    fn complete_file_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SCH_settings.json");
        let original = r#"{"enabled":false,"mode":"x","random_seed":1,"extra":0}"#;
        std::fs::write(&path, original).unwrap();

        assert_eq!(heal_json_file(&path, &defaults()).unwrap(), HealAction::Untouched);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn prune_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kept.py"), "").unwrap();
        let snapshot: BTreeMap<String, u64> =
            [("kept.py".to_string(), 1), ("gone.py".to_string(), 2)].into();

        let (cleaned, issues) = prune_snapshot(snapshot, dir.path());
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned.contains_key("kept.py"));
        assert_eq!(issues, vec!["SNAPSHOT_MISSING_FILE:gone.py"]);
    }

    #[test]
    fn heal_record_issue_codes() {
        let record = HealRecord {
            path: PathBuf::from("SafeGuard/SGD_state.json"),
            action: HealAction::Reset,
        };
        assert_eq!(record.issue().as_deref(), Some("JSON_PARSE_FIXED:SGD_state.json"));
    }
}
