//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod agent;
pub mod error;
pub mod health;
pub mod job;
pub mod material;
pub mod pipeline;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::repository::PipelineConfigRepository;
use crate::service::{AgentRegistry, ScheduleService};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub schedule: Arc<ScheduleService>,
    pub pipelines: Arc<PipelineConfigRepository>,
    pub agents: Arc<AgentRegistry>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/api/pipeline/create", post(pipeline::create_pipeline))
        .route("/api/pipeline/list", get(pipeline::list_pipelines))
        .route("/api/pipeline/{name}", get(pipeline::get_pipeline))
        .route("/api/pipeline/{name}/queue", get(pipeline::build_queue))
        .route("/api/pipeline/{name}/materials", get(pipeline::materials))
        .route("/api/pipeline/{name}/schedule", post(pipeline::schedule))
        // Job endpoints
        .route("/api/job/list/scheduled", get(job::list_scheduled_builds))
        .route("/api/job/{id}", get(job::get_job))
        .route("/api/job/{id}/reschedule", post(job::reschedule_job))
        .route("/api/job/{id}/assign", post(job::assign_job))
        .route("/api/job/{id}/state", post(job::update_job_state))
        .route("/api/job/{id}/complete", post(job::complete_job))
        .route("/api/job/{id}/cancel", post(job::cancel_job))
        .route(
            "/api/job/status/{pipeline}/{stage}/{job}",
            get(job::current_job),
        )
        // Agent endpoints
        .route("/api/agent/ping", post(agent::ping))
        .route("/api/agent/list", get(agent::list_agents))
        // Material endpoints
        .route("/api/material/notify/git", post(material::notify_git))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

