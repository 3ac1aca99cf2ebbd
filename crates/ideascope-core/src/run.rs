//! The state of one execution attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::progress::{estimate_progress, ProgressInput};
use crate::{AnalysisMode, ApprovalRequest, CheckpointId, RunBudget, RunId, RunResult, SessionId};

/// One execution attempt of the analysis loop.
///
/// Owned by the run controller for its lifetime and turned into a
/// [`RunResult`] when it terminates.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub id: RunId,
    pub description: String,
    pub mode: AnalysisMode,
    pub budget: RunBudget,
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub output: String,
    pub tool_calls: u32,
    pub interrupted: bool,
    pub checkpoint_id: Option<CheckpointId>,
    /// Progress of the run this one resumes, for time-based estimates.
    pub previous_progress: u8,
}

impl TaskRun {
    /// Create a new TaskRun.
    pub fn new(
        description: impl Into<String>,
        mode: AnalysisMode,
        budget: RunBudget,
        session_id: SessionId,
    ) -> Self {
        Self {
            id: RunId::generate(),
            description: description.into(),
            mode,
            budget,
            session_id,
            started_at: Utc::now(),
            output: String::new(),
            tool_calls: 0,
            interrupted: false,
            checkpoint_id: None,
            previous_progress: 0,
        }
    }

    /// Builder method to seed progress from an earlier run.
    pub fn with_previous_progress(mut self, progress: u8) -> Self {
        self.previous_progress = progress;
        self
    }

    /// Append model text to the accumulated output.
    pub fn append_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Mark the run as interrupted. Idempotent.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    /// Estimate progress for the current state.
    pub fn progress(&self, elapsed: Duration) -> u8 {
        estimate_progress(ProgressInput {
            interrupted: self.interrupted,
            tool_calls: self.tool_calls,
            max_tool_calls: self.budget.max_tool_calls,
            elapsed,
            timeout: self.budget.timeout,
            previous_progress: self.previous_progress,
        })
    }

    /// Consume the run into its final result.
    pub fn finish(self, elapsed: Duration) -> RunResult {
        let progress = self.progress(elapsed);
        RunResult {
            text: self.output,
            interrupted: self.interrupted,
            progress,
            checkpoint_id: self.checkpoint_id,
            approval: None,
        }
    }

    /// Consume the run into a suspended-for-approval result.
    ///
    /// The run counts as interrupted: it has not finished and must be resumed.
    pub fn suspend(mut self, elapsed: Duration, approval: ApprovalRequest) -> RunResult {
        self.interrupt();
        let progress = self.progress(elapsed);
        RunResult {
            text: self.output,
            interrupted: true,
            progress,
            checkpoint_id: self.checkpoint_id,
            approval: Some(approval),
        }
    }
}
