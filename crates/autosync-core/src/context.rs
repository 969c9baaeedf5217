//! Explicit run context threaded through every AutoSync operation.

use std::path::{Path, PathBuf};

use crate::config::{AutosyncConfig, CONFIG_RELATIVE_PATH};
use crate::error::Result;

/// Base directory plus loaded configuration.
#[derive(Debug, Clone)]
pub struct AutosyncContext {
    base_dir: PathBuf,
    config: AutosyncConfig,
}

impl AutosyncContext {
    pub fn new(base_dir: impl Into<PathBuf>, config: AutosyncConfig) -> Self {
        Self {
            base_dir: base_dir.into(),
            config,
        }
    }

    /// Open `base_dir`: create the working directories and load (or create)
    /// the config file.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let (config, _created) = AutosyncConfig::load_or_init(&base_dir.join(CONFIG_RELATIVE_PATH))?;
        let ctx = Self::new(base_dir, config);
        ctx.ensure_dirs()?;
        Ok(ctx)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.logs_dir(), self.state_dir(), self.base_dir.join("config")] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config(&self) -> &AutosyncConfig {
        &self.config
    }

    /// Resolve a configured path; relative paths are joined onto the base dir.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_RELATIVE_PATH)
    }

    pub fn plan_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.plan)
    }

    pub fn status_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.status)
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.state)
    }

    pub fn state_dir(&self) -> PathBuf {
        match self.state_path().parent() {
            Some(dir) => dir.to_path_buf(),
            None => self.base_dir.clone(),
        }
    }

    pub fn loop_history_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.loop_history)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.snapshot)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.resolve(&self.config.paths.logs)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.resolve(&self.config.paths.reports)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.resolve(&self.config.paths.backups)
    }

    pub fn sandbox_dir(&self) -> PathBuf {
        self.resolve(&self.config.paths.sandbox)
    }

    /// Configured module directories, resolved, in name order.
    pub fn module_dirs(&self) -> Vec<(String, PathBuf)> {
        self.config
            .modules
            .iter()
            .filter_map(|(name, m)| m.dir.as_ref().map(|d| (name.clone(), self.resolve(d))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_layout_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AutosyncContext::open(dir.path()).unwrap();
        assert!(ctx.config_path().exists());
        assert!(ctx.logs_dir().is_dir());
        assert!(ctx.state_dir().is_dir());
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let ctx = AutosyncContext::new("/srv/autosync", AutosyncConfig::default());
        assert_eq!(
            ctx.resolve(Path::new("/etc/other.json")),
            PathBuf::from("/etc/other.json")
        );
        assert_eq!(
            ctx.plan_path(),
            PathBuf::from("/srv/autosync/plan/autosync_plan.json")
        );
    }
}
