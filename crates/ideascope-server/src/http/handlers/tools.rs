//! Tool listing handler.

use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::warn;

use crate::http::responses::ToolsResponse;
use crate::state::AppState;

/// Tools the engine reports. Best-effort: failures yield an empty list.
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<ToolsResponse> {
    let tools = match state.engine.list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            warn!(error = %e, "Failed to list engine tools");
            Vec::new()
        }
    };
    Json(ToolsResponse { tools })
}
