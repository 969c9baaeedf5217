//! AutoSync Core Library
//!
//! Planning, gated execution, patch safety, self-healing and the convergence
//! loop for rolling changes out across independently versioned modules.

pub mod config;
pub mod context;
pub mod deploy;
pub mod domain;
pub mod error;
pub mod gate;
pub mod hybrid;
pub mod metrics;
pub mod obs;
pub mod patch;
pub mod persist;
pub mod pipeline;
pub mod planner;
pub mod runner;
pub mod self_healing;
pub mod structure;
pub mod telemetry;

pub use config::{
    AutosyncConfig, CommandSpec, DeployConfig, GateConfig, HealTarget, LoopConfig, ModuleConfig,
    PatchConfig, StageConfig, ValidatorConfig,
};
pub use context::AutosyncContext;
pub use deploy::{DeployChain, DeployError, DeployOutcome};
pub use domain::{
    FileHealthStore, Health, HealthStore, LoopStats, ModuleStatus, PatchResult, PipelineRunResult,
    Plan, PlanAction, PlanItem, RunState,
};
pub use error::{AutosyncError, Result};
pub use gate::{BuiltinSafetyGate, GateError, GateOutcome, GateReport, SafetyGate};
pub use hybrid::{HybridLoop, LoopOptions, LoopSummary, StopReason};
pub use metrics::METRICS;
pub use patch::{
    EditOp, GuardReport, Intent, Issue, PatchEngine, PatchError, PatchOutcome, PatchRequest,
    SourceValidator, ValidationStatus,
};
pub use pipeline::{PipelineExecutor, PipelineStep};
pub use planner::{build_plan, PlanBuilder};
pub use runner::{ModuleRunner, RunnerError, RunnerOutput};
pub use self_healing::{
    heal_configured, heal_json_file, heal_snapshot, prune_snapshot, HealAction, HealRecord,
};
pub use telemetry::init_tracing;
