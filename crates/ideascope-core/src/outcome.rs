//! Terminal results of a run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ApprovalId, CheckpointId, SessionId};

/// The gated tool call a suspended run is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub approval_id: ApprovalId,
    pub session_id: SessionId,
    pub tool_name: String,
    pub tool_args: Value,
}

/// Output of a run, complete or partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub text: String,
    pub interrupted: bool,
    /// 0-100. Exactly 100 only when `interrupted` is false.
    pub progress: u8,
    pub checkpoint_id: Option<CheckpointId>,
    /// Present only when the run suspended for approval.
    pub approval: Option<ApprovalRequest>,
}

impl RunResult {
    pub fn needs_approval(&self) -> bool {
        self.approval.is_some()
    }
}

/// Why a run produced no usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Another execution occupies the engine. Retry later.
    Busy,
    /// The engine failed without producing recoverable state.
    Engine,
}

/// A failed run, with whatever partial state existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
    pub partial_text: String,
    pub checkpoint_id: Option<CheckpointId>,
}

impl RunFailure {
    pub fn busy(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Busy,
            message: message.into(),
            partial_text: String::new(),
            checkpoint_id: None,
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Engine,
            message: message.into(),
            partial_text: String::new(),
            checkpoint_id: None,
        }
    }
}

/// Result of executing one run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The event stream ended normally.
    Completed(RunResult),
    /// Budget, timeout, or a stream error cut the run short.
    Interrupted(RunResult),
    /// A gated tool call is waiting for a human decision.
    SuspendedForApproval(RunResult),
    Failed(RunFailure),
}

impl RunOutcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Interrupted(_) => "interrupted",
            Self::SuspendedForApproval(_) => "suspended",
            Self::Failed(f) if f.kind == FailureKind::Busy => "busy",
            Self::Failed(_) => "failed",
        }
    }

    pub fn result(&self) -> Option<&RunResult> {
        match self {
            Self::Completed(r) | Self::Interrupted(r) | Self::SuspendedForApproval(r) => Some(r),
            Self::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<RunResult, RunFailure> {
        match self {
            Self::Completed(r) | Self::Interrupted(r) | Self::SuspendedForApproval(r) => Ok(r),
            Self::Failed(f) => Err(f),
        }
    }
}
