//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gantry_core::domain::graph::GraphError;

use crate::repository::StoreError;
use crate::service::agent::AgentRegistryError;
use crate::service::schedule::ScheduleError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(err) => ApiError::DatabaseError(err),
            StoreError::Unavailable(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::JobNotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            ScheduleError::PipelineNotFound(name) => {
                ApiError::NotFound(format!("Pipeline {} not found", name))
            }
            ScheduleError::StageNotFound { pipeline, stage } => {
                ApiError::NotFound(format!("Stage '{}' not found in pipeline {}", stage, pipeline))
            }
            ScheduleError::InvalidState(msg) => ApiError::Conflict(msg),
            ScheduleError::Store(err) => err.into(),
        }
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::UnknownPipeline(name) => {
                ApiError::NotFound(format!("Pipeline {} not found", name))
            }
            GraphError::Cycle(_) => ApiError::BadRequest(err.to_string()),
            GraphError::UnknownNode(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<AgentRegistryError> for ApiError {
    fn from(err: AgentRegistryError) -> Self {
        match err {
            AgentRegistryError::DuplicateCookie(uuid) => ApiError::Conflict(format!(
                "Agent {} is already pinging from another process",
                uuid
            )),
            AgentRegistryError::Agent(err) => ApiError::BadRequest(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
