//! Structure snapshots used to short-circuit no-op deploys.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::error::Result;
use crate::persist;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub modified: u64,
}

/// Relative path (forward slashes) to file metadata.
pub type Snapshot = BTreeMap<String, FileMeta>;

/// Difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl StructureDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

fn excluded(entry: &DirEntry, exclude: &[String]) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| exclude.iter().any(|x| x == name))
}

/// Walk `root`, skipping any directory or file whose name is in `exclude`.
pub fn scan(root: &Path, exclude: &[String]) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !excluded(e, exclude));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata().map_err(std::io::Error::from)?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        snapshot.insert(
            rel,
            FileMeta {
                size: meta.len(),
                modified,
            },
        );
    }
    Ok(snapshot)
}

pub fn diff(previous: &Snapshot, current: &Snapshot) -> StructureDiff {
    let mut out = StructureDiff::default();
    for (path, meta) in current {
        match previous.get(path) {
            None => out.added.push(path.clone()),
            Some(old) if old != meta => out.modified.push(path.clone()),
            Some(_) => {}
        }
    }
    out.removed = previous
        .keys()
        .filter(|p| !current.contains_key(*p))
        .cloned()
        .collect();
    out
}

/// Load a persisted snapshot; a missing file is an empty snapshot.
pub fn load(path: &Path) -> Result<Snapshot> {
    if !path.exists() {
        return Ok(Snapshot::new());
    }
    persist::read_json(path)
}

pub fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    persist::write_json_atomic(path, snapshot)
}
