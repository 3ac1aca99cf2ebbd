//! ideascope Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - HTTP
//! - The model/tool execution engine
//! - Runtime specifics
//!
//! Everything the run controller reasons about (budgets, approvals,
//! checkpoints, results, progress) is defined here.

pub mod approval;
pub mod checkpoint;
pub mod clock;
pub mod error;
pub mod ids;
pub mod mode;
pub mod outcome;
pub mod progress;
pub mod report;
pub mod run;

// Re-export commonly used types
pub use approval::{ApprovalDecision, ApprovalKey, PendingApproval};
pub use checkpoint::Checkpoint;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use ids::{ApprovalId, CheckpointId, ReportId, RunId, SessionId};
pub use mode::{AnalysisMode, QuickLimits, RunBudget};
pub use outcome::{ApprovalRequest, FailureKind, RunFailure, RunOutcome, RunResult};
pub use progress::{estimate_progress, ProgressInput, INTERRUPTED_PROGRESS_CEILING};
pub use report::{AnalysisOptions, Report, ReportSummary};
pub use run::TaskRun;
