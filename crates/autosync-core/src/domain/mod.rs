//! Domain records shared by every AutoSync layer.

pub mod health;
pub mod plan;
pub mod run;

pub use health::{FileHealthStore, Health, HealthStore, ModuleStatus};
pub use plan::{Plan, PlanAction, PlanItem};
pub use run::{LoopStats, PatchResult, PipelineRunResult, RunState};
