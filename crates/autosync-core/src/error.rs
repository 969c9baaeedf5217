//! Crate-level error taxonomy for AutoSync.

use std::path::PathBuf;

/// Errors raised while loading or validating persisted records.
#[derive(Debug, thiserror::Error)]
pub enum AutosyncError {
    #[error("config file {path} is invalid: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("plan file not found: {0}")]
    PlanMissing(PathBuf),

    #[error("plan file {path} is invalid: {reason}")]
    InvalidPlan { path: PathBuf, reason: String },

    #[error("module status file not found: {0}")]
    StatusMissing(PathBuf),

    #[error("module status for {module} is invalid: {reason}")]
    InvalidStatus { module: String, reason: String },

    #[error("loop bounds invalid: max_loops={max_loops}, min_loops={min_loops}")]
    InvalidLoopBounds { max_loops: u32, min_loops: u32 },

    #[error("digest mismatch for {path}: expected {expected}, got {actual}")]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for AutoSync core operations.
pub type Result<T> = std::result::Result<T, AutosyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_bounds_error_display() {
        let err = AutosyncError::InvalidLoopBounds {
            max_loops: 2,
            min_loops: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("max_loops=2"));
        assert!(msg.contains("min_loops=3"));
    }

    #[test]
    fn test_invalid_status_names_module() {
        let err = AutosyncError::InvalidStatus {
            module: "Scheduler".to_string(),
            reason: "missing field `health`".to_string(),
        };
        assert!(err.to_string().contains("Scheduler"));
        assert!(err.to_string().contains("health"));
    }
}
