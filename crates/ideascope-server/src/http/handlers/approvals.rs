//! Approval handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::info;

use ideascope_core::PendingApproval;

use crate::http::error::ApiError;
use crate::http::responses::{DecisionRequest, DecisionResponse};
use crate::state::AppState;

/// List approvals awaiting a decision.
pub async fn list_approvals(State(state): State<Arc<AppState>>) -> Json<Vec<PendingApproval>> {
    Json(state.approvals.list_pending())
}

/// Record an approve/reject decision.
pub async fn decide_approval(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let decision = state
        .approvals
        .decide(&req.approval_id, req.approved, req.reason)?;
    info!(
        approval_id = %req.approval_id,
        approved = decision.approved,
        "Decision recorded via HTTP"
    );
    Ok(Json(DecisionResponse {
        success: true,
        session_id: decision.session_id,
        tool_name: decision.tool_name,
        approved: decision.approved,
    }))
}
