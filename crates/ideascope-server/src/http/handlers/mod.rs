//! HTTP request handlers.

mod analysis;
mod approvals;
mod checkpoints;
mod health;
mod reports;
mod tools;

pub use analysis::{analyze, analyze_upload};
pub use approvals::{decide_approval, list_approvals};
pub use checkpoints::{apply_checkpoint, create_checkpoint, delete_checkpoint, list_checkpoints};
pub use health::{health_check, metrics_handler};
pub use reports::{delete_report, get_report, list_reports, reanalyze_report};
pub use tools::list_tools;
