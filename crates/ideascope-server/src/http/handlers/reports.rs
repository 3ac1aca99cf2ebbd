//! Report handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use ideascope_core::{Report, ReportId, ReportSummary};

use crate::http::error::ApiError;
use crate::http::responses::SuccessResponse;
use crate::service::AnalysisResponse;
use crate::state::AppState;

/// List report summaries, newest first.
pub async fn list_reports(State(state): State<Arc<AppState>>) -> Json<Vec<ReportSummary>> {
    Json(state.reports.list().await)
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Report>, ApiError> {
    let id = ReportId::new(id);
    state
        .reports
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Report not found: {id}")))
}

pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = ReportId::new(id);
    if !state.reports.delete(&id).await {
        return Err(ApiError::NotFound(format!("Report not found: {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}

/// Run a stored report's idea again under a new session.
pub async fn reanalyze_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let response = state.analysis.reanalyze(&ReportId::new(id)).await?;
    Ok(Json(response))
}
