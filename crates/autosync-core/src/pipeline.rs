//! Pipeline executor: runs a plan, consults the safety gate, persists the result.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::context::AutosyncContext;
use crate::domain::{
    HealthStore, PatchResult, PipelineRunResult, Plan, PlanAction, PlanItem, RunState,
};
use crate::error::{AutosyncError, Result};
use crate::gate::{state_from_gate, SafetyGate};
use crate::metrics::METRICS;
use crate::obs;
use crate::planner::PlanBuilder;
use crate::runner::ModuleRunner;

/// One full pipeline pass, as seen by the hybrid loop.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    async fn run_once(&self, dry_run: bool) -> Result<PipelineRunResult>;
}

/// Executes PATCH items through a [`ModuleRunner`] and gates the result.
pub struct PipelineExecutor {
    runner: Arc<dyn ModuleRunner>,
    gate: Option<Arc<dyn SafetyGate>>,
    self_module: String,
    plan_path: PathBuf,
    state_path: PathBuf,
    planner: Option<Replanner>,
}

/// Health source used to rebuild the plan before every pass.
struct Replanner {
    store: Arc<dyn HealthStore>,
    serial_order: Vec<String>,
}

impl PipelineExecutor {
    pub fn new(
        runner: Arc<dyn ModuleRunner>,
        gate: Option<Arc<dyn SafetyGate>>,
        self_module: impl Into<String>,
        plan_path: PathBuf,
        state_path: PathBuf,
    ) -> Self {
        Self {
            runner,
            gate,
            self_module: self_module.into(),
            plan_path,
            state_path,
            planner: None,
        }
    }

    /// Rebuild and save the plan from `store` at the start of every
    /// [`PipelineStep::run_once`], so the loop reacts to fresh health data.
    pub fn with_planner(mut self, store: Arc<dyn HealthStore>, serial_order: Vec<String>) -> Self {
        self.planner = Some(Replanner {
            store,
            serial_order,
        });
        self
    }

    pub fn from_context(
        ctx: &AutosyncContext,
        runner: Arc<dyn ModuleRunner>,
        gate: Option<Arc<dyn SafetyGate>>,
    ) -> Self {
        Self::new(
            runner,
            gate,
            ctx.config().self_module.clone(),
            ctx.plan_path(),
            ctx.state_path(),
        )
    }

    /// Load the plan file and execute it. A missing or unreadable plan yields
    /// a persisted `NO_PLAN` result.
    pub async fn run_from_file(&self, dry_run: bool) -> Result<PipelineRunResult> {
        match Plan::load(&self.plan_path) {
            Ok(plan) => self.execute(plan, dry_run).await,
            Err(AutosyncError::PlanMissing(path)) => {
                error!(path = %path.display(), "plan file missing");
                self.finish(RunState::NoPlan, Vec::new(), dry_run)
            }
            Err(AutosyncError::InvalidPlan { path, reason }) => {
                error!(path = %path.display(), reason = %reason, "plan file invalid");
                self.finish(RunState::NoPlan, Vec::new(), dry_run)
            }
            Err(e) => Err(e),
        }
    }

    /// Build a fresh plan from the health store, save it, then execute it.
    /// Unreadable health data yields a persisted `NO_PLAN` result. Without a
    /// configured store this is the same as [`Self::run_from_file`].
    pub async fn run_planned(&self, dry_run: bool) -> Result<PipelineRunResult> {
        let Some(planner) = &self.planner else {
            return self.run_from_file(dry_run).await;
        };
        let built = PlanBuilder::new(planner.store.as_ref(), &planner.serial_order).build();
        let plan = match built {
            Ok(plan) => plan,
            Err(
                e @ (AutosyncError::StatusMissing(_)
                | AutosyncError::InvalidStatus { .. }
                | AutosyncError::Serialization(_)),
            ) => {
                error!(error = %e, "health status unusable, cannot plan");
                return self.finish(RunState::NoPlan, Vec::new(), dry_run);
            }
            Err(e) => return Err(e),
        };
        plan.save(&self.plan_path)?;
        info!(items = plan.items.len(), path = %self.plan_path.display(), "plan rebuilt");
        self.execute(plan, dry_run).await
    }

    /// Execute `plan` in ascending priority order.
    pub async fn execute(&self, mut plan: Plan, dry_run: bool) -> Result<PipelineRunResult> {
        METRICS.inc_pipeline_runs();
        obs::emit_pipeline_started(plan.items.len(), dry_run);

        if plan.is_empty() {
            error!("plan has no items");
            return self.finish(RunState::NoPlan, Vec::new(), dry_run);
        }

        plan.sort();
        for dup in plan.dedup_modules() {
            warn!(module = %dup.module, action = %dup.action, priority = dup.priority, "duplicate plan item skipped");
        }

        let mut results = Vec::new();
        for item in &plan.items {
            match &item.action {
                PlanAction::CheckOnly | PlanAction::Skip => obs::emit_item_skipped(item, "no_action"),
                PlanAction::Other(raw) => {
                    warn!(module = %item.module, action = %raw, "unknown plan action skipped");
                }
                PlanAction::Patch if dry_run => obs::emit_item_skipped(item, "dry_run"),
                PlanAction::Patch => {
                    let result = self.patch(item).await;
                    obs::emit_patch_result(&result);
                    results.push(result);
                }
            }
        }

        let state = if dry_run {
            RunState::Unknown
        } else {
            match &self.gate {
                None => {
                    error!("no safety gate configured");
                    RunState::NoSafeguard
                }
                Some(gate) => {
                    METRICS.inc_gate_checks();
                    let outcome = gate.check().await;
                    if let Err(e) = &outcome {
                        error!(error = %e, "safety gate did not run");
                    }
                    let state = state_from_gate(&outcome);
                    obs::emit_gate_evaluated(state);
                    state
                }
            }
        };

        self.finish(state, results, dry_run)
    }

    async fn patch(&self, item: &PlanItem) -> PatchResult {
        if item.module == self.self_module {
            info!(module = %item.module, "self module is never patched by the pipeline");
            return PatchResult::new(&item.module, item.action.clone(), true, 0, "self module skipped");
        }

        match self.runner.run(item).await {
            Ok(output) => {
                if output.succeeded() {
                    METRICS.inc_modules_patched();
                } else {
                    METRICS.inc_module_failures();
                }
                PatchResult::new(
                    &item.module,
                    item.action.clone(),
                    output.succeeded(),
                    output.exit_code,
                    output.summary(),
                )
            }
            Err(e) => {
                METRICS.inc_module_failures();
                PatchResult::failed(&item.module, item.action.clone(), &e.to_string())
            }
        }
    }

    fn finish(
        &self,
        state: RunState,
        results: Vec<PatchResult>,
        dry_run: bool,
    ) -> Result<PipelineRunResult> {
        let result = PipelineRunResult::new(state, results, dry_run);
        result.save(&self.state_path)?;
        obs::emit_pipeline_finished(state, result.patched_count(), dry_run);
        Ok(result)
    }
}

#[async_trait]
impl PipelineStep for PipelineExecutor {
    async fn run_once(&self, dry_run: bool) -> Result<PipelineRunResult> {
        self.run_planned(dry_run).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{GateError, GateOutcome};
    use crate::runner::{RunnerError, RunnerOutput};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModuleRunner for RecordingRunner {
        async fn run(&self, item: &PlanItem) -> std::result::Result<RunnerOutput, RunnerError> {
            self.calls.lock().unwrap().push(item.module.clone());
            if item.module == "Broken" {
                return Err(RunnerError::ModuleConfigMissing(item.module.clone()));
            }
            Ok(RunnerOutput {
                exit_code: 0,
                stdout: format!("{} ok", item.module),
                stderr: String::new(),
            })
        }
    }

    struct FixedGate(bool);

    #[async_trait]
    impl SafetyGate for FixedGate {
        async fn check(&self) -> std::result::Result<GateOutcome, GateError> {
            Ok(GateOutcome {
                passed: self.0,
                details: vec![],
            })
        }
    }

    fn patch(module: &str, priority: u32) -> PlanItem {
        PlanItem {
            module: module.to_string(),
            action: PlanAction::Patch,
            priority,
            reason: "health_red".to_string(),
            target_version: None,
        }
    }

    fn executor(dir: &std::path::Path, runner: Arc<RecordingRunner>, gate: bool) -> PipelineExecutor {
        PipelineExecutor::new(
            runner,
            Some(Arc::new(FixedGate(gate))),
            "AutoSync",
            dir.join("plan.json"),
            dir.join("state.json"),
        )
    }

    #[tokio::test]
    async fn runner_failure_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let exec = executor(dir.path(), runner.clone(), true);
        let plan = Plan {
            serial_order: vec![],
            items: vec![patch("Scheduler", 30), patch("Broken", 10)],
        };

        let result = exec.execute(plan, false).await.unwrap();
        assert_eq!(*runner.calls.lock().unwrap(), vec!["Broken", "Scheduler"]);
        assert_eq!(result.patch_results.len(), 2);
        assert!(!result.patch_results[0].success);
        assert_eq!(result.patch_results[0].exit_code, -1);
        assert!(result.patch_results[1].success);
        assert_eq!(result.state, RunState::Green);
    }

    #[tokio::test]
    async fn self_module_is_recorded_but_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let exec = executor(dir.path(), runner.clone(), true);
        let plan = Plan {
            serial_order: vec![],
            items: vec![patch("AutoSync", 0)],
        };

        let result = exec.execute(plan, false).await.unwrap();
        assert!(runner.calls.lock().unwrap().is_empty());
        assert!(result.patch_results[0].success);
    }

    #[tokio::test]
    async fn empty_plan_is_no_plan_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path(), Arc::new(RecordingRunner::default()), true);

        let result = exec.execute(Plan::default(), false).await.unwrap();
        assert_eq!(result.state, RunState::NoPlan);
        let saved = PipelineRunResult::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(saved.state, RunState::NoPlan);
    }

    #[tokio::test]
    async fn missing_gate_is_no_safeguard() {
        let dir = tempfile::tempdir().unwrap();
        let exec = PipelineExecutor::new(
            Arc::new(RecordingRunner::default()),
            None,
            "AutoSync",
            dir.path().join("plan.json"),
            dir.path().join("state.json"),
        );
        let plan = Plan {
            serial_order: vec![],
            items: vec![patch("Scheduler", 30)],
        };
        let result = exec.execute(plan, false).await.unwrap();
        assert_eq!(result.state, RunState::NoSafeguard);
    }

    #[tokio::test]
    async fn replanning_from_missing_status_is_no_plan() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::domain::FileHealthStore::new(dir.path().join("modules_status.json"));
        let exec = executor(dir.path(), Arc::new(RecordingRunner::default()), true)
            .with_planner(Arc::new(store), vec!["Scheduler".to_string()]);

        let result = exec.run_once(false).await.unwrap();
        assert_eq!(result.state, RunState::NoPlan);
        assert!(!dir.path().join("plan.json").exists());
    }

    #[tokio::test]
    async fn replanning_saves_the_fresh_plan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("plan.json"),
            r#"{"serial_order": [], "items": []}"#,
        )
        .unwrap();
        let statuses: std::collections::BTreeMap<String, crate::domain::ModuleStatus> = [(
            "Scheduler".to_string(),
            crate::domain::ModuleStatus::new("Scheduler", "1.0", crate::domain::Health::Red),
        )]
        .into();
        let runner = Arc::new(RecordingRunner::default());
        let exec = executor(dir.path(), runner.clone(), true)
            .with_planner(Arc::new(statuses), vec!["Scheduler".to_string()]);

        let result = exec.run_once(false).await.unwrap();
        assert_eq!(*runner.calls.lock().unwrap(), vec!["Scheduler"]);
        assert_eq!(result.state, RunState::Green);
        let saved = Plan::load(&dir.path().join("plan.json")).unwrap();
        assert_eq!(saved.items.len(), 1);
        assert_eq!(saved.items[0].action, PlanAction::Patch);
    }

    #[tokio::test]
    async fn invalid_plan_file_is_no_plan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plan.json"), "{\"items\": 3}").unwrap();
        let exec = executor(dir.path(), Arc::new(RecordingRunner::default()), true);
        let result = exec.run_from_file(false).await.unwrap();
        assert_eq!(result.state, RunState::NoPlan);
    }
}
