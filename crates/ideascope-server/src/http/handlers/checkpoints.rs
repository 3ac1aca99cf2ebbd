//! Checkpoint handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use ideascope_core::{Checkpoint, CheckpointId};

use crate::http::error::ApiError;
use crate::http::responses::{CreateCheckpointRequest, SuccessResponse};
use crate::state::AppState;

pub async fn list_checkpoints(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Checkpoint>>, ApiError> {
    Ok(Json(state.checkpoints.list().await?))
}

pub async fn create_checkpoint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCheckpointRequest>,
) -> Result<(StatusCode, Json<Checkpoint>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Checkpoint name must not be empty".to_string()));
    }
    let checkpoint = state.checkpoints.create(name).await?;
    Ok((StatusCode::CREATED, Json(checkpoint)))
}

/// Apply a checkpoint. Unlike the restore before a run, failure is reported.
pub async fn apply_checkpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.checkpoints.apply(&CheckpointId::new(id)).await?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn delete_checkpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id = CheckpointId::new(id);
    if !state.checkpoints.delete(&id).await? {
        return Err(ApiError::NotFound(format!("Checkpoint not found: {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}
