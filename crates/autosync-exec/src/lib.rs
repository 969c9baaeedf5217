//! Subprocess-backed implementations of the AutoSync core seams.
//!
//! - [`ProcessModuleRunner`]: runs each module's configured script
//! - [`CommandSafetyGate`]: external gate in check mode
//! - [`CommandValidator`]: syntax and simulate commands for the patch engine
//! - [`StagedDeployChain`]: structure diff, re-validation and deploy stages

pub mod deploy;
pub mod error;
pub mod gate;
pub mod process;
pub mod runner;
pub mod validator;

pub use deploy::StagedDeployChain;
pub use error::ExecError;
pub use gate::{gate_from_context, CommandSafetyGate};
pub use process::{run_command, CommandResult};
pub use runner::{ProcessModuleRunner, TARGET_VERSION_ENV};
pub use validator::CommandValidator;
