//! HTTP request and response types.

use serde::{Deserialize, Serialize};

use ideascope_core::{AnalysisMode, AnalysisOptions, ApprovalId, CheckpointId, SessionId};

use crate::service::AnalysisRequest;

// ============================================================================
// Analysis types
// ============================================================================

/// Request body for the analyze endpoint. Missing fields take the defaults of
/// [`AnalysisOptions`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub idea: String,
    #[serde(default)]
    pub mode: Option<AnalysisMode>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub allow_web_tools: Option<bool>,
    #[serde(default)]
    pub auto_continue: Option<bool>,
    #[serde(default)]
    pub approval_required: Option<bool>,
    #[serde(default)]
    pub resume_checkpoint_id: Option<CheckpointId>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub previous_progress: Option<u8>,
}

impl AnalyzeRequest {
    pub fn into_analysis(self) -> AnalysisRequest {
        let defaults = AnalysisOptions::default();
        AnalysisRequest {
            idea: self.idea,
            options: AnalysisOptions {
                mode: self.mode.unwrap_or(defaults.mode),
                language: self.language.unwrap_or(defaults.language),
                persona: self.persona.unwrap_or(defaults.persona),
                model: self.model.filter(|m| !m.trim().is_empty()),
                allow_web_tools: self.allow_web_tools.unwrap_or(defaults.allow_web_tools),
                auto_continue: self.auto_continue.unwrap_or(defaults.auto_continue),
                approval_required: self.approval_required.unwrap_or(defaults.approval_required),
            },
            sources: Vec::new(),
            session_id: self.session_id.filter(|s| !s.as_str().is_empty()),
            resume_checkpoint_id: self.resume_checkpoint_id.filter(|c| !c.as_str().is_empty()),
            previous_progress: self.previous_progress.unwrap_or(0),
        }
    }
}

// ============================================================================
// Approval types
// ============================================================================

/// Request body for recording a decision.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub approval_id: ApprovalId,
    pub approved: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub success: bool,
    pub session_id: SessionId,
    pub tool_name: String,
    pub approved: bool,
}

// ============================================================================
// Checkpoint types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCheckpointRequest {
    pub name: String,
}

// ============================================================================
// Shared types
// ============================================================================

/// Response for delete and apply operations.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<String>,
}

/// Error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_report: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,
}

