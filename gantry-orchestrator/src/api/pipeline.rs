//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline configuration, dependency analysis and
//! scheduling.

use axum::{
    Json,
    extract::{Path, State},
};
use gantry_core::domain::pipeline::PipelineConfig;
use gantry_core::dto::job::JobSummary;
use gantry_core::dto::pipeline::{
    MaterialSummary, PipelineMaterials, PipelineSummary, QueueEntrySummary, SchedulePipeline,
};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /api/pipeline/create
/// Create or replace a pipeline configuration
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<PipelineConfig>,
) -> ApiResult<Json<PipelineSummary>> {
    tracing::info!("Creating pipeline: {}", req.name);

    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Pipeline name cannot be empty".to_string(),
        ));
    }

    let summary = PipelineSummary::from(&req);
    state
        .pipelines
        .save(req)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok(Json(summary))
}

/// GET /api/pipeline/list
/// List all pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> Json<Vec<PipelineSummary>> {
    tracing::debug!("Listing all pipelines");

    let pipelines = state.pipelines.list().await;
    Json(pipelines.iter().map(PipelineSummary::from).collect())
}

/// GET /api/pipeline/{name}
/// Get a pipeline configuration by name
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<PipelineConfig>> {
    tracing::debug!("Getting pipeline: {}", name);

    let pipeline = state
        .pipelines
        .find(&name)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Pipeline {} not found", name)))?;

    Ok(Json(pipeline))
}

/// GET /api/pipeline/{name}/queue
/// Upstream build queue of a pipeline, one entry per path
pub async fn build_queue(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<QueueEntrySummary>>> {
    tracing::debug!("Building queue for pipeline: {}", name);

    let graph = state.pipelines.dependency_graph(&name).await?;
    let root = graph
        .root()
        .ok_or_else(|| ApiError::NotFound(format!("Pipeline {} not found", name)))?;

    Ok(Json(
        root.build_queue().iter().map(QueueEntrySummary::from).collect(),
    ))
}

/// GET /api/pipeline/{name}/materials
/// Unshared materials and every fingerprint in the pipeline's graph
pub async fn materials(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<PipelineMaterials>> {
    tracing::debug!("Analysing materials of pipeline: {}", name);

    let graph = state.pipelines.dependency_graph(&name).await?;
    let root = graph
        .root()
        .ok_or_else(|| ApiError::NotFound(format!("Pipeline {} not found", name)))?;

    let mut fingerprints: Vec<String> = root.all_material_fingerprints().into_iter().collect();
    fingerprints.sort();

    Ok(Json(PipelineMaterials {
        pipeline: root.pipeline().name.clone(),
        unshared: root
            .unshared_material_configs()
            .into_iter()
            .map(MaterialSummary::from)
            .collect(),
        fingerprints,
    }))
}

/// POST /api/pipeline/{name}/schedule
/// Schedule a stage of a pipeline run
pub async fn schedule(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SchedulePipeline>,
) -> ApiResult<Json<Vec<JobSummary>>> {
    tracing::info!("Scheduling pipeline {} run {}", name, req.counter);

    if req.counter < 1 {
        return Err(ApiError::BadRequest(
            "Pipeline counter must be positive".to_string(),
        ));
    }

    let jobs = state
        .schedule
        .schedule_stage(&name, req.counter, req.label.as_deref(), req.stage.as_deref())
        .await?;

    Ok(Json(jobs.iter().map(JobSummary::from).collect()))
}
