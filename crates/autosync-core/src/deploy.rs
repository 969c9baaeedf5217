//! Deploy chain seam, invoked by the hybrid loop only after a GREEN pipeline.

use async_trait::async_trait;

/// Non-fatal ways a deploy chain can finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Every stage ran.
    Deployed { stages: Vec<String> },
    /// The tree did not change since the last deploy; nothing ran.
    NoChange,
    /// Re-validation refused to continue; nothing ran.
    Blocked { reason: String },
}

/// Deploy failures are fatal to the hybrid loop and never retried.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("deploy stage {stage} failed with exit code {exit_code}: {output}")]
    StageFailed {
        stage: String,
        exit_code: i32,
        output: String,
    },

    #[error("deploy stage {stage} could not be started: {reason}")]
    Invocation { stage: String, reason: String },

    #[error("structure snapshot failed: {0}")]
    Snapshot(#[from] crate::error::AutosyncError),
}

#[async_trait]
pub trait DeployChain: Send + Sync {
    async fn deploy(&self) -> Result<DeployOutcome, DeployError>;
}
