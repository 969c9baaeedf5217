//! Hybrid loop controller: repeat pipeline (+ deploy) until converged or stopped.
//!
//! Per iteration:
//! 1. run the pipeline once and record its stats
//! 2. stop if the state is not GREEN
//! 3. run the deploy chain unless dry-run or deploy is disabled; an error stops the loop
//! 4. stop at `max_loops`
//! 5. stop once nothing was patched and `min_loops` iterations have run
//! 6. otherwise sleep (if configured) and go again

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn, Instrument};

use crate::config::LoopConfig;
use crate::deploy::{DeployChain, DeployOutcome};
use crate::domain::{LoopStats, RunState};
use crate::error::{AutosyncError, Result};
use crate::metrics::METRICS;
use crate::pipeline::PipelineStep;
use crate::{obs, persist};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
    pub max_loops: u32,
    pub min_loops: u32,
    pub sleep: Duration,
    pub dry_run: bool,
    pub disable_deploy: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        LoopConfig::default().into()
    }
}

impl From<LoopConfig> for LoopOptions {
    fn from(c: LoopConfig) -> Self {
        Self {
            max_loops: c.max_loops,
            min_loops: c.min_loops,
            sleep: Duration::from_secs(c.sleep_secs),
            dry_run: false,
            disable_deploy: false,
        }
    }
}

impl LoopOptions {
    /// `max_loops >= 1` and `min_loops <= max_loops`.
    pub fn validate(&self) -> Result<()> {
        if self.max_loops == 0 || self.min_loops > self.max_loops {
            return Err(AutosyncError::InvalidLoopBounds {
                max_loops: self.max_loops,
                min_loops: self.min_loops,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NotGreen,
    DeployFailed,
    MaxLoops,
    Converged,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::NotGreen => "not_green",
            StopReason::DeployFailed => "deploy_failed",
            StopReason::MaxLoops => "max_loops",
            StopReason::Converged => "converged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub loops_ran: u32,
    pub total_patched: usize,
    pub last_state: RunState,
    pub loop_stats: Vec<LoopStats>,
    pub stop_reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_error: Option<String>,
}

pub struct HybridLoop<'a> {
    pipeline: &'a dyn PipelineStep,
    deploy: Option<&'a dyn DeployChain>,
    history_path: Option<PathBuf>,
}

impl<'a> HybridLoop<'a> {
    pub fn new(pipeline: &'a dyn PipelineStep, deploy: Option<&'a dyn DeployChain>) -> Self {
        Self {
            pipeline,
            deploy,
            history_path: None,
        }
    }

    /// Append every iteration's stats to `path` as JSON lines.
    pub fn with_history(mut self, path: PathBuf) -> Self {
        self.history_path = Some(path);
        self
    }

    pub async fn run(&self, opts: LoopOptions) -> Result<LoopSummary> {
        opts.validate()?;
        info!(
            max_loops = opts.max_loops,
            min_loops = opts.min_loops,
            sleep_ms = opts.sleep.as_millis() as u64,
            dry_run = opts.dry_run,
            disable_deploy = opts.disable_deploy,
            "hybrid loop starting"
        );

        let mut loop_stats = Vec::new();
        let mut total_patched = 0usize;
        let mut deploy_error = None;

        let (last_state, stop_reason) = loop {
            let loop_index = loop_stats.len() as u32 + 1;
            let result = self
                .pipeline
                .run_once(opts.dry_run)
                .instrument(obs::loop_span(loop_index))
                .await?;
            let stats = LoopStats {
                loop_index,
                patched_count: result.patched_count(),
                state: result.state,
                timestamp: Utc::now(),
            };
            obs::emit_loop_iteration(&stats);
            if let Some(path) = &self.history_path {
                persist::append_json_line(path, &stats)?;
            }
            total_patched += stats.patched_count;
            let (state, patched) = (stats.state, stats.patched_count);
            loop_stats.push(stats);

            if !state.is_green() {
                warn!(state = %state, "pipeline not GREEN; stopping");
                break (state, StopReason::NotGreen);
            }

            if !opts.dry_run && !opts.disable_deploy {
                if let Some(chain) = self.deploy {
                    METRICS.inc_deploys();
                    match chain.deploy().await {
                        Ok(DeployOutcome::Deployed { stages }) => {
                            info!(stages = ?stages, "deploy chain completed")
                        }
                        Ok(DeployOutcome::NoChange) => info!("deploy chain: no structural change"),
                        Ok(DeployOutcome::Blocked { reason }) => {
                            warn!(reason = %reason, "deploy chain blocked")
                        }
                        Err(e) => {
                            error!(error = %e, "deploy chain failed; stopping");
                            deploy_error = Some(e.to_string());
                            break (state, StopReason::DeployFailed);
                        }
                    }
                }
            }

            if loop_index >= opts.max_loops {
                break (state, StopReason::MaxLoops);
            }
            if patched == 0 && loop_index >= opts.min_loops {
                break (state, StopReason::Converged);
            }

            if !opts.sleep.is_zero() {
                tokio::time::sleep(opts.sleep).await;
            }
        };

        let loops_ran = loop_stats.len() as u32;
        obs::emit_loop_finished(loops_ran, total_patched, last_state, stop_reason.as_str());
        METRICS.flush();

        Ok(LoopSummary {
            loops_ran,
            total_patched,
            last_state,
            loop_stats,
            stop_reason,
            deploy_error,
        })
    }
}
