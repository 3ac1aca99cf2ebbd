//! ideascope analysis server library.
//!
//! Wires the execution engine to a single-flight run controller with budget
//! enforcement, a human approval gate for web tools, checkpoint-based
//! resumption, and an HTTP surface for submitting ideas and deciding
//! approvals.

pub mod approval;
pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod gate;
pub mod http;
pub mod interceptor;
pub mod metrics;
pub mod reports;
pub mod scheduler;
pub mod service;
pub mod state;

pub use approval::{spawn_retention_sweep, ApprovalStore};
pub use config::Config;
pub use controller::{RunController, RunSpec};
pub use interceptor::CallCounting;
pub use scheduler::RunScheduler;
pub use service::{AnalysisRequest, AnalysisResponse, AnalysisService};
pub use state::AppState;
