//! Analysis submission handlers.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use tracing::{debug, info};

use ideascope_core::{AnalysisMode, CheckpointId, SessionId};

use crate::http::error::ApiError;
use crate::http::responses::AnalyzeRequest;
use crate::service::{AnalysisRequest, AnalysisResponse, SourceDocument};
use crate::state::AppState;

/// Submit an idea for analysis.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let request = req.into_analysis();
    info!(
        mode = %request.options.mode,
        session_id = ?request.session_id,
        "Analysis submitted"
    );
    let response = state.analysis.analyze(request).await?;
    Ok(Json(response))
}

/// Submit an idea with attached source files.
///
/// Text fields use the same names as the JSON body. Every field with a file
/// name is read as a UTF-8 source document.
pub async fn analyze_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let mut request = AnalysisRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read {file_name}: {e}")))?;
            debug!(file = %file_name, size = bytes.len(), "Received source file");
            request.sources.push(SourceDocument {
                name: file_name,
                content: String::from_utf8_lossy(&bytes).into_owned(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field {name}: {e}")))?;
        apply_field(&mut request, &name, value.trim())?;
    }

    info!(
        mode = %request.options.mode,
        sources = request.sources.len(),
        "Analysis with attachments submitted"
    );
    let response = state.analysis.analyze(request).await?;
    Ok(Json(response))
}

fn apply_field(request: &mut AnalysisRequest, name: &str, value: &str) -> Result<(), ApiError> {
    let options = &mut request.options;
    match name {
        "idea" => request.idea = value.to_string(),
        "mode" => {
            options.mode = value
                .parse::<AnalysisMode>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        }
        "language" if !value.is_empty() => options.language = value.to_string(),
        "persona" if !value.is_empty() => options.persona = value.to_string(),
        "model" if !value.is_empty() => options.model = Some(value.to_string()),
        "allowWebTools" => options.allow_web_tools = parse_flag(name, value)?,
        "autoContinue" => options.auto_continue = parse_flag(name, value)?,
        "approvalRequired" => options.approval_required = parse_flag(name, value)?,
        "sessionId" if !value.is_empty() => request.session_id = Some(SessionId::new(value)),
        "resumeCheckpointId" if !value.is_empty() => {
            request.resume_checkpoint_id = Some(CheckpointId::new(value));
        }
        "previousProgress" if !value.is_empty() => {
            request.previous_progress = value
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("Invalid previousProgress: {value}")))?;
        }
        other => debug!(field = %other, "Ignoring multipart field"),
    }
    Ok(())
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ApiError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" | "" => Ok(false),
        _ => Err(ApiError::BadRequest(format!("Invalid boolean for {name}: {value}"))),
    }
}
