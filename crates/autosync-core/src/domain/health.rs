//! Module health records and the store that supplies them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AutosyncError, Result};

/// Reported health of one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Health {
    Green,
    Yellow,
    Red,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Health::Green => "GREEN",
            Health::Yellow => "YELLOW",
            Health::Red => "RED",
            Health::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Version and health snapshot for a single module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub name: String,
    pub current_version: String,
    pub target_version: Option<String>,
    pub health: Health,
}

impl ModuleStatus {
    pub fn new(name: impl Into<String>, current_version: impl Into<String>, health: Health) -> Self {
        Self {
            name: name.into(),
            current_version: current_version.into(),
            target_version: None,
            health,
        }
    }

    pub fn with_target(mut self, target_version: impl Into<String>) -> Self {
        self.target_version = Some(target_version.into());
        self
    }

    /// True when a target version is set and differs from the current one.
    pub fn version_mismatch(&self) -> bool {
        self.target_version
            .as_deref()
            .is_some_and(|t| !t.is_empty() && t != self.current_version)
    }
}

/// On-disk shape of one entry in the status file (keyed by module name).
#[derive(Debug, Deserialize)]
struct StatusFields {
    current_version: String,
    #[serde(default)]
    target_version: Option<String>,
    health: Health,
}

/// Source of per-module status records.
pub trait HealthStore: Send + Sync {
    fn load(&self) -> Result<BTreeMap<String, ModuleStatus>>;
}

impl HealthStore for BTreeMap<String, ModuleStatus> {
    fn load(&self) -> Result<BTreeMap<String, ModuleStatus>> {
        Ok(self.clone())
    }
}

/// Reads `{ "<module>": {current_version, target_version, health} }` from disk.
#[derive(Debug, Clone)]
pub struct FileHealthStore {
    path: PathBuf,
}

impl FileHealthStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a status document, validating every entry.
    pub fn parse(raw: &str) -> Result<BTreeMap<String, ModuleStatus>> {
        let entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
        let mut out = BTreeMap::new();
        for (name, value) in entries {
            let fields: StatusFields =
                serde_json::from_value(value).map_err(|e| AutosyncError::InvalidStatus {
                    module: name.clone(),
                    reason: e.to_string(),
                })?;
            out.insert(
                name.clone(),
                ModuleStatus {
                    name,
                    current_version: fields.current_version,
                    target_version: fields.target_version,
                    health: fields.health,
                },
            );
        }
        Ok(out)
    }
}

impl HealthStore for FileHealthStore {
    fn load(&self) -> Result<BTreeMap<String, ModuleStatus>> {
        if !self.path.exists() {
            return Err(AutosyncError::StatusMissing(self.path.clone()));
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Self::parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_health_string_maps_to_unknown() {
        let parsed = FileHealthStore::parse(
            r#"{"Scheduler": {"current_version": "1.0", "health": "PURPLE"}}"#,
        )
        .unwrap();
        assert_eq!(parsed["Scheduler"].health, Health::Unknown);
        assert_eq!(parsed["Scheduler"].target_version, None);
    }

    #[test]
    fn missing_required_field_is_rejected_with_module_name() {
        let err = FileHealthStore::parse(r#"{"WebRack": {"health": "GREEN"}}"#).unwrap_err();
        match err {
            AutosyncError::InvalidStatus { module, reason } => {
                assert_eq!(module, "WebRack");
                assert!(reason.contains("current_version"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn version_mismatch_ignores_absent_target() {
        let status = ModuleStatus::new("Scheduler", "1.0", Health::Green);
        assert!(!status.version_mismatch());
        assert!(status.clone().with_target("1.1").version_mismatch());
        assert!(!status.with_target("1.0").version_mismatch());
    }

    #[test]
    fn missing_file_reports_status_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHealthStore::new(dir.path().join("modules_status.json"));
        assert!(matches!(store.load(), Err(AutosyncError::StatusMissing(_))));
    }
}
