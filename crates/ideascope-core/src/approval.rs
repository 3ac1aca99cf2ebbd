//! Approval records for gated tool calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ApprovalId, CheckpointId, SessionId};

/// Key under which decisions and pending requests are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApprovalKey {
    pub session_id: SessionId,
    pub tool_name: String,
}

impl ApprovalKey {
    pub fn new(session_id: SessionId, tool_name: impl Into<String>) -> Self {
        Self {
            session_id,
            tool_name: tool_name.into(),
        }
    }
}

/// A suspended decision point waiting for a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub approval_id: ApprovalId,
    pub session_id: SessionId,
    pub tool_name: String,
    pub tool_args: Value,
    pub created_at: DateTime<Utc>,
    /// Absent when checkpoint creation failed or the request came from a
    /// tool error.
    pub checkpoint_id: Option<CheckpointId>,
}

impl PendingApproval {
    /// Create a new pending approval with a fresh id.
    pub fn new(
        session_id: SessionId,
        tool_name: impl Into<String>,
        tool_args: Value,
        checkpoint_id: Option<CheckpointId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            approval_id: ApprovalId::generate(),
            session_id,
            tool_name: tool_name.into(),
            tool_args,
            created_at,
            checkpoint_id,
        }
    }
}

/// A recorded human decision for a (session, tool) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub session_id: SessionId,
    pub tool_name: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
}
