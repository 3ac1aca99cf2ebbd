//! HTTP server.
//!
//! Provides endpoints for:
//! - Analysis submission (`/api/analyze`, `/api/analyze/upload`)
//! - Approval decisions (`/api/approvals`)
//! - Checkpoint management (`/api/checkpoints`)
//! - Report management (`/api/reports`)
//! - Tool listing (`/api/tools`)
//! - Health check (`/health`) and Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod error;
mod handlers;
pub mod responses;

pub use error::ApiError;

/// Body limit for uploads with attached sources.
const UPLOAD_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer for the web UI
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Analysis
        .route("/api/analyze", post(handlers::analyze))
        .route(
            "/api/analyze/upload",
            post(handlers::analyze_upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        // Approvals
        .route(
            "/api/approvals",
            get(handlers::list_approvals).post(handlers::decide_approval),
        )
        // Checkpoints
        .route(
            "/api/checkpoints",
            get(handlers::list_checkpoints).post(handlers::create_checkpoint),
        )
        .route("/api/checkpoints/:id", delete(handlers::delete_checkpoint))
        .route("/api/checkpoints/:id/apply", post(handlers::apply_checkpoint))
        // Reports
        .route("/api/reports", get(handlers::list_reports))
        .route(
            "/api/reports/:id",
            get(handlers::get_report).delete(handlers::delete_report),
        )
        .route("/api/reports/:id/reanalyze", post(handlers::reanalyze_report))
        .route("/api/tools", get(handlers::list_tools))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
