//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use ideascope_core::QuickLimits;

use crate::interceptor::CallCounting;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub bind_addr: String,

    /// Path to the Claude Code CLI binary.
    pub claude_path: String,

    /// Working directory for engine runs.
    pub working_dir: Option<PathBuf>,

    /// Model used when a request does not name one.
    pub default_model: Option<String>,

    /// Text appended to the engine's system prompt.
    pub system_prompt: Option<String>,

    /// Extra environment variables for the engine process.
    pub engine_env: Vec<(String, String)>,

    /// Budgets for quick-mode runs. Deep mode is fixed.
    pub quick: QuickLimits,

    /// How long an undecided approval is kept.
    pub approval_retention: Duration,

    /// How often expired approvals are purged.
    pub retention_sweep_interval: Duration,

    /// Continuation rounds per request when auto-continue is on.
    pub max_auto_continues: u32,

    /// Which tool calls count against the budget.
    pub call_counting: CallCounting,

    /// Submissions that may wait for the execution slot.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            claude_path: "claude".to_string(),
            working_dir: None,
            default_model: None,
            system_prompt: None,
            engine_env: Vec::new(),
            quick: QuickLimits::default(),
            approval_retention: Duration::from_secs(60 * 60),
            retention_sweep_interval: Duration::from_secs(60),
            max_auto_continues: 3,
            call_counting: CallCounting::default(),
            queue_capacity: 64,
        }
    }
}

/// Parse a `KEY=VALUE` pair for the engine environment.
pub fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{s}`")),
    }
}
