//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use ideascope_agent::EngineError;
use ideascope_core::CheckpointId;

use crate::approval::ApprovalError;
use crate::http::responses::ErrorResponse;
use crate::service::AnalysisError;

/// Errors returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or invalid request.
    BadRequest(String),
    /// Unknown id.
    NotFound(String),
    /// The engine is occupied. Retry later.
    Busy(String),
    /// The run failed. Carries any partial report and checkpoint.
    RunFailed {
        message: String,
        partial_report: String,
        checkpoint_id: Option<CheckpointId>,
    },
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, plain(message)),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, plain(message)),
            ApiError::Busy(message) => (StatusCode::SERVICE_UNAVAILABLE, plain(message)),
            ApiError::RunFailed {
                message,
                partial_report,
                checkpoint_id,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: message,
                    partial_report: Some(partial_report),
                    checkpoint_id,
                },
            ),
            ApiError::Internal(message) => {
                error!(error = %message, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, plain(message))
            }
        };
        (status, Json(body)).into_response()
    }
}

fn plain(error: String) -> ErrorResponse {
    ErrorResponse {
        error,
        partial_report: None,
        checkpoint_id: None,
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            AnalysisError::ReportNotFound(_) => ApiError::NotFound(err.to_string()),
            AnalysisError::Busy(message) => ApiError::Busy(message),
            AnalysisError::Engine {
                message,
                partial_report,
                checkpoint_id,
            } => ApiError::RunFailed {
                message,
                partial_report,
                checkpoint_id,
            },
            AnalysisError::Scheduler(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        match err {
            ApprovalError::NotFound(_) => ApiError::NotFound(err.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::CheckpointNotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::ConcurrencyConflict => ApiError::Busy(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
