//! Health Check API Handler
//!
//! Liveness endpoint for monitoring. Does not touch the job store.

use axum::{http::StatusCode, response::IntoResponse};

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
