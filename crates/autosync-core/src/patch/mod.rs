//! Patch-safety engine.
//!
//! A patch request goes sandbox → edit → validate → simulate → backup → apply.
//! The real target is only touched after every check passed and a durable
//! backup exists. [`guard`] runs the validation step alone over arbitrary files.

pub mod backup;
pub mod danger;
pub mod edit;
pub mod engine;
pub mod error;
pub mod guard;
pub mod validate;

pub use backup::{read_backup, BackupRecord};
pub use danger::{DangerCategory, DangerSignature, DEFAULT_SIGNATURES};
pub use edit::{EditOp, EditSettings, Intent};
pub use engine::{PatchEngine, PatchOutcome, PatchRequest};
pub use error::PatchError;
pub use guard::{GuardReport, GuardResult, GuardSummary};
pub use validate::{Issue, JsonValidator, SandboxValidation, SourceValidator, ValidationStatus};
