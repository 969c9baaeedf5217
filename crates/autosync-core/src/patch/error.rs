//! Infrastructure failures of the patch engine.
//!
//! Rejected patches are not errors; they are reported through
//! [`PatchOutcome`](super::PatchOutcome).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("invalid version pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("version pattern must have two capture groups, found {0}")]
    PatternGroups(usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] crate::error::AutosyncError),
}

pub type PatchResult<T> = std::result::Result<T, PatchError>;
