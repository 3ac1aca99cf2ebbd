//! Process-wide approval tables.
//!
//! Pending approvals and recorded decisions live behind one mutex so that the
//! gate's look-up-then-insert and the HTTP decision path never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use ideascope_core::{
    ApprovalDecision, ApprovalId, ApprovalKey, CheckpointId, Clock, PendingApproval, SessionId,
    SystemClock,
};

/// Approval store errors.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval not found or expired: {0}")]
    NotFound(ApprovalId),
}

/// Where a (session, tool) pair stands.
#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Unseen,
    Pending(PendingApproval),
    Approved,
    Rejected,
}

/// Result of [`ApprovalStore::open`].
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// A new pending approval was recorded.
    Created(PendingApproval),
    /// One was already outstanding for the key.
    Existing(PendingApproval),
    /// A decision landed first.
    Decided { approved: bool },
}

#[derive(Debug, Default)]
struct Tables {
    pending: HashMap<ApprovalKey, PendingApproval>,
    decisions: HashMap<ApprovalKey, ApprovalDecision>,
}

impl Tables {
    fn state(&self, key: &ApprovalKey) -> GateState {
        if let Some(decision) = self.decisions.get(key) {
            return if decision.approved {
                GateState::Approved
            } else {
                GateState::Rejected
            };
        }
        match self.pending.get(key) {
            Some(pending) => GateState::Pending(pending.clone()),
            None => GateState::Unseen,
        }
    }
}

pub struct ApprovalStore {
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
    retention: chrono::Duration,
}

impl ApprovalStore {
    pub fn new(retention: Duration) -> Self {
        Self::with_clock(retention, Arc::new(SystemClock))
    }

    pub fn with_clock(retention: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            clock,
            retention: chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self, key: &ApprovalKey) -> GateState {
        self.tables().state(key)
    }

    /// Record a pending approval unless the key already has one or a decision.
    pub fn open(
        &self,
        session_id: SessionId,
        tool_name: &str,
        tool_args: Value,
        checkpoint_id: Option<CheckpointId>,
    ) -> Admission {
        let key = ApprovalKey::new(session_id.clone(), tool_name);
        let mut tables = self.tables();
        match tables.state(&key) {
            GateState::Approved => Admission::Decided { approved: true },
            GateState::Rejected => Admission::Decided { approved: false },
            GateState::Pending(pending) => Admission::Existing(pending),
            GateState::Unseen => {
                let pending = PendingApproval::new(
                    session_id,
                    tool_name,
                    tool_args,
                    checkpoint_id,
                    self.clock.now(),
                );
                info!(
                    approval_id = %pending.approval_id,
                    session_id = %pending.session_id,
                    tool = %pending.tool_name,
                    "Approval requested"
                );
                tables.pending.insert(key, pending.clone());
                Admission::Created(pending)
            }
        }
    }

    /// Record a decision for a pending approval and drop the pending entry.
    pub fn decide(
        &self,
        approval_id: &ApprovalId,
        approved: bool,
        reason: Option<String>,
    ) -> Result<ApprovalDecision, ApprovalError> {
        let mut tables = self.tables();
        let key = tables
            .pending
            .iter()
            .find(|(_, pending)| &pending.approval_id == approval_id)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| ApprovalError::NotFound(approval_id.clone()))?;

        tables.pending.remove(&key);
        let decision = ApprovalDecision {
            session_id: key.session_id.clone(),
            tool_name: key.tool_name.clone(),
            approved,
            reason,
            decided_at: self.clock.now(),
        };
        info!(
            approval_id = %approval_id,
            session_id = %decision.session_id,
            tool = %decision.tool_name,
            approved,
            "Approval decided"
        );
        tables.decisions.insert(key, decision.clone());
        Ok(decision)
    }

    /// Outstanding approvals, oldest first.
    pub fn list_pending(&self) -> Vec<PendingApproval> {
        let mut pending: Vec<_> = self.tables().pending.values().cloned().collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.tables().pending.len()
    }

    /// Drop pending approvals older than the retention window. Decisions are
    /// kept.
    pub fn purge_expired(&self) -> usize {
        let Some(cutoff) = self.clock.now().checked_sub_signed(self.retention) else {
            return 0;
        };
        let mut tables = self.tables();
        let before = tables.pending.len();
        tables.pending.retain(|_, pending| pending.created_at > cutoff);
        let purged = before - tables.pending.len();
        if purged > 0 {
            info!(purged, "Purged expired approvals");
        }
        purged
    }
}

/// Purge expired approvals every `every` until the runtime shuts down.
pub fn spawn_retention_sweep(store: Arc<ApprovalStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            debug!(purged, "Approval retention sweep");
        }
    })
}
