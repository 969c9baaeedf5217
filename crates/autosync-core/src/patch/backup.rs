//! Durable pre-apply backups with a SHA-256 digest sidecar.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{AutosyncError, Result};
use crate::persist::sha256_hex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub digest: String,
}

fn digest_path(backup: &Path) -> PathBuf {
    let mut name = backup.as_os_str().to_os_string();
    name.push(".digest");
    PathBuf::from(name)
}

/// Copy `target` into `backups_dir` as `<name>.<timestamp>.<id>.bak` and sync it.
pub fn create(target: &Path, backups_dir: &Path) -> Result<BackupRecord> {
    fs::create_dir_all(backups_dir)?;
    let bytes = fs::read(target)?;

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "target".to_string());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let id = uuid::Uuid::new_v4().simple().to_string();
    let path = backups_dir.join(format!("{name}.{stamp}.{}.bak", &id[..8]));

    let mut file = File::create(&path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;

    let digest = sha256_hex(&bytes);
    let mut sidecar = File::create(digest_path(&path))?;
    sidecar.write_all(digest.as_bytes())?;
    sidecar.sync_all()?;

    Ok(BackupRecord { path, digest })
}

/// Read a backup and verify it against its digest sidecar.
pub fn read_backup(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path)?;
    let expected = fs::read_to_string(digest_path(path))?;
    let actual = sha256_hex(&bytes);
    if expected.trim() != actual {
        return Err(AutosyncError::DigestMismatch {
            path: path.to_path_buf(),
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_matches_source_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("run.py");
        fs::write(&target, b"# Version: 1.0\n").unwrap();

        let record = create(&target, &dir.path().join("backups")).unwrap();
        assert_eq!(read_backup(&record.path).unwrap(), b"# Version: 1.0\n");
    }

    #[test]
    fn tampered_backup_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("run.py");
        fs::write(&target, b"original").unwrap();

        let record = create(&target, dir.path()).unwrap();
        fs::write(&record.path, b"tampered").unwrap();
        assert!(matches!(
            read_backup(&record.path),
            Err(AutosyncError::DigestMismatch { .. })
        ));
    }
}
