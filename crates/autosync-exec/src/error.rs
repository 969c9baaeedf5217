use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("program not found: {0}")]
    ProgramMissing(PathBuf),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
