//! Human-in-the-loop gate for web tools.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use ideascope_core::{ApprovalKey, ApprovalRequest, CheckpointId, PendingApproval, SessionId};

use crate::approval::{Admission, ApprovalStore, GateState};
use crate::checkpoint::CheckpointCoordinator;
use crate::interceptor::{is_gated_error, is_gated_tool};

/// What the gate decided for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Execute,
    Skip { reason: String },
    /// Stop the run and wait for a decision.
    Suspend {
        request: ApprovalRequest,
        checkpoint_id: Option<CheckpointId>,
    },
}

impl GateVerdict {
    fn suspend(pending: PendingApproval) -> Self {
        let checkpoint_id = pending.checkpoint_id.clone();
        Self::Suspend {
            request: ApprovalRequest {
                approval_id: pending.approval_id,
                session_id: pending.session_id,
                tool_name: pending.tool_name,
                tool_args: pending.tool_args,
            },
            checkpoint_id,
        }
    }

    fn decided(approved: bool, tool: &str) -> Self {
        if approved {
            Self::Execute
        } else {
            Self::Skip {
                reason: format!("{tool} was rejected for this session"),
            }
        }
    }
}

pub struct ApprovalGate {
    store: Arc<ApprovalStore>,
    checkpoints: CheckpointCoordinator,
}

impl ApprovalGate {
    pub fn new(store: Arc<ApprovalStore>, checkpoints: CheckpointCoordinator) -> Self {
        Self { store, checkpoints }
    }

    /// Decide a gated tool call.
    ///
    /// The first call for a (session, tool) snapshots the run, records a
    /// pending approval and suspends. Later calls before a decision suspend on
    /// the same approval.
    pub async fn check_call(&self, session_id: &SessionId, tool: &str, args: &Value) -> GateVerdict {
        let key = ApprovalKey::new(session_id.clone(), tool);
        match self.store.state(&key) {
            GateState::Approved => return GateVerdict::Execute,
            GateState::Rejected => {
                debug!(session_id = %session_id, tool = %tool, "Gated call rejected earlier, skipping");
                return GateVerdict::decided(false, tool);
            }
            GateState::Pending(pending) => {
                debug!(approval_id = %pending.approval_id, "Reusing pending approval");
                return GateVerdict::suspend(pending);
            }
            GateState::Unseen => {}
        }

        let checkpoint_id = self
            .checkpoints
            .try_create(&format!("approval-{session_id}-{tool}"))
            .await;
        self.admit(session_id, tool, args, checkpoint_id)
    }

    /// Decide a tool error. Returns a suspension when the error is a known
    /// parameter-shape failure of a gated tool with no decision yet. No
    /// checkpoint is taken.
    pub fn check_error(
        &self,
        session_id: &SessionId,
        tool: &str,
        message: &str,
        args: &Value,
    ) -> Option<GateVerdict> {
        if !is_gated_tool(tool) || !is_gated_error(message) {
            return None;
        }
        match self.admit(session_id, tool, args, None) {
            verdict @ GateVerdict::Suspend { .. } => {
                info!(session_id = %session_id, tool = %tool, "Gated tool error needs approval");
                Some(verdict)
            }
            _ => None,
        }
    }

    fn admit(
        &self,
        session_id: &SessionId,
        tool: &str,
        args: &Value,
        checkpoint_id: Option<CheckpointId>,
    ) -> GateVerdict {
        match self
            .store
            .open(session_id.clone(), tool, args.clone(), checkpoint_id)
        {
            Admission::Created(pending) | Admission::Existing(pending) => {
                GateVerdict::suspend(pending)
            }
            Admission::Decided { approved } => GateVerdict::decided(approved, tool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ideascope_agent::ScriptedEngine;
    use serde_json::json;

    fn gate() -> (ApprovalGate, Arc<ApprovalStore>, Arc<ScriptedEngine>) {
        let engine = Arc::new(ScriptedEngine::new());
        let store = Arc::new(ApprovalStore::new(Duration::from_secs(3600)));
        let gate = ApprovalGate::new(store.clone(), CheckpointCoordinator::new(engine.clone()));
        (gate, store, engine)
    }

    #[tokio::test]
    async fn test_first_call_suspends_with_checkpoint() {
        let (gate, store, engine) = gate();
        let session = SessionId::new("s1");

        let verdict = gate.check_call(&session, "web_search", &json!({"query": "q"})).await;
        let GateVerdict::Suspend {
            request,
            checkpoint_id,
        } = verdict
        else {
            panic!("expected suspension");
        };
        assert!(!request.approval_id.as_str().is_empty());
        assert_eq!(request.tool_name, "web_search");
        assert_eq!(request.tool_args, json!({"query": "q"}));
        assert!(checkpoint_id.is_some());
        assert_eq!(store.pending_count(), 1);
        assert_eq!(engine.checkpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_second_call_reuses_pending() {
        let (gate, store, engine) = gate();
        let session = SessionId::new("s1");

        let first = gate.check_call(&session, "web_search", &json!({})).await;
        let second = gate.check_call(&session, "web_search", &json!({})).await;
        assert_eq!(first, second);
        assert_eq!(store.pending_count(), 1);
        assert_eq!(engine.checkpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_still_suspends() {
        let (gate, _, engine) = gate();
        engine.set_fail_checkpoints(true);
        let verdict = gate
            .check_call(&SessionId::new("s1"), "web_search", &json!({}))
            .await;
        assert!(matches!(
            verdict,
            GateVerdict::Suspend {
                checkpoint_id: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_decisions_drive_execute_and_skip() {
        let (gate, store, _) = gate();
        let session = SessionId::new("s1");

        for tool in ["web_search", "web_fetch"] {
            gate.check_call(&session, tool, &json!({})).await;
        }
        let pending = store.list_pending();
        for approval in &pending {
            store
                .decide(&approval.approval_id, approval.tool_name == "web_fetch", None)
                .unwrap();
        }

        assert!(matches!(
            gate.check_call(&session, "web_search", &json!({})).await,
            GateVerdict::Skip { .. }
        ));
        assert_eq!(
            gate.check_call(&session, "web_fetch", &json!({})).await,
            GateVerdict::Execute
        );
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_gated_error_requests_approval_without_checkpoint() {
        let (gate, store, engine) = gate();
        let session = SessionId::new("s1");

        assert!(gate
            .check_error(&session, "calculator", "invalid_type", &json!({}))
            .is_none());
        assert!(gate
            .check_error(&session, "web_search", "timeout", &json!({}))
            .is_none());

        let verdict = gate.check_error(
            &session,
            "web_search",
            "Invalid_type: expected object at sources[0]",
            &json!({"sources": ["web"]}),
        );
        assert!(matches!(
            verdict,
            Some(GateVerdict::Suspend {
                checkpoint_id: None,
                ..
            })
        ));
        assert_eq!(store.pending_count(), 1);
        assert_eq!(engine.checkpoint_count(), 0);

        let approval_id = store.list_pending()[0].approval_id.clone();
        store.decide(&approval_id, true, None).unwrap();
        assert!(gate
            .check_error(&session, "web_search", "invalid_type", &json!({}))
            .is_none());
    }
}
