//! Material API Handlers
//!
//! Post-commit notifications from source control.

use axum::{Json, extract::State};
use gantry_core::dto::material::{GitNotification, NotificationResponse};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /api/material/notify/git
/// Find the pipelines built from a git repository
///
/// Credentials in the notified url are ignored when matching.
pub async fn notify_git(
    State(state): State<AppState>,
    Json(req): Json<GitNotification>,
) -> ApiResult<Json<NotificationResponse>> {
    if req.repository_url.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Repository url cannot be empty".to_string(),
        ));
    }

    let pipelines = state
        .pipelines
        .pipelines_with_git_url(&req.repository_url)
        .await;

    tracing::info!(
        "Git notification matched {} pipelines",
        pipelines.len()
    );

    Ok(Json(NotificationResponse { pipelines }))
}
