//! Job API Handlers
//!
//! HTTP endpoints for job lifecycle management.

use axum::{
    Json,
    extract::{Path, State},
};
use gantry_core::dto::job::{
    AssignJob, CompleteJob, JobSummary, RescheduleResponse, ScheduledBuild, UpdateJobState,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::schedule::RescheduleOutcome;

// =============================================================================
// Job Queries
// =============================================================================

/// GET /api/job/list/scheduled
/// Jobs waiting for an agent, in scheduling order
pub async fn list_scheduled_builds(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ScheduledBuild>>> {
    tracing::debug!("Listing scheduled builds");

    let plans = state.schedule.ordered_scheduled_builds().await?;
    Ok(Json(plans.iter().map(ScheduledBuild::from).collect()))
}

/// GET /api/job/{id}
/// Get job details by ID
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobSummary>> {
    tracing::debug!("Getting job: {}", id);

    let job = state.schedule.find_job(id).await?;
    Ok(Json(JobSummary::from(&job)))
}

/// GET /api/job/status/{pipeline}/{stage}/{job}
/// Latest instance of a configured job
pub async fn current_job(
    State(state): State<AppState>,
    Path((pipeline, stage, job)): Path<(String, String, String)>,
) -> ApiResult<Json<JobSummary>> {
    tracing::debug!("Getting current job: {}/{}/{}", pipeline, stage, job);

    let current = state
        .schedule
        .current_job(&pipeline, &stage, &job)
        .await
        .ok_or_else(|| {
            ApiError::NotFound(format!("No job {}/{}/{} has run", pipeline, stage, job))
        })?;

    Ok(Json(JobSummary::from(&current)))
}

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// POST /api/job/{id}/reschedule
/// Replace a hung job with a fresh scheduled instance
pub async fn reschedule_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RescheduleResponse>> {
    tracing::info!("Rescheduling job: {}", id);

    let response = match state.schedule.reschedule_job(id).await? {
        RescheduleOutcome::Rescheduled { new_job } => RescheduleResponse {
            job_id: id,
            rescheduled: true,
            new_job: Some(JobSummary::from(&new_job)),
            reason: None,
        },
        RescheduleOutcome::NotRescheduled(reason) => RescheduleResponse {
            job_id: id,
            rescheduled: false,
            new_job: None,
            reason: Some(reason.to_string()),
        },
    };

    Ok(Json(response))
}

/// POST /api/job/{id}/assign
/// Hand a scheduled job to an agent
pub async fn assign_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignJob>,
) -> ApiResult<Json<JobSummary>> {
    tracing::info!("Assigning job {} to agent {}", id, req.agent_uuid);

    if req.agent_uuid.trim().is_empty() {
        return Err(ApiError::BadRequest("Agent uuid cannot be empty".to_string()));
    }

    let job = state.schedule.assign_job(id, &req.agent_uuid).await?;
    Ok(Json(JobSummary::from(&job)))
}

/// POST /api/job/{id}/state
/// Record a state reported by the agent running the job
pub async fn update_job_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateJobState>,
) -> ApiResult<Json<JobSummary>> {
    tracing::debug!("Job {} reported state {}", id, req.state);

    let job = state
        .schedule
        .update_job_state(id, req.state)
        .await
        .map_err(|e| match e {
            crate::service::schedule::ScheduleError::InvalidState(msg) => ApiError::BadRequest(msg),
            other => other.into(),
        })?;

    Ok(Json(JobSummary::from(&job)))
}

/// POST /api/job/{id}/complete
/// Mark job as completed with result
pub async fn complete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteJob>,
) -> ApiResult<Json<JobSummary>> {
    tracing::info!("Completing job {} with result {}", id, req.result);

    let job = state.schedule.complete_job(id, req.result).await?;
    Ok(Json(JobSummary::from(&job)))
}

/// POST /api/job/{id}/cancel
/// Cancel a job that has not completed yet
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobSummary>> {
    tracing::info!("Cancelling job: {}", id);

    let job = state.schedule.cancel_job(id).await?;
    Ok(Json(JobSummary::from(&job)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gantry_core::domain::job::{JobResult, JobState};
    use gantry_core::domain::material::MaterialConfig;
    use gantry_core::domain::pipeline::{JobConfig, PipelineConfig, StageConfig};

    use crate::repository::{InMemoryJobStore, PipelineConfigRepository};
    use crate::service::{AgentRegistry, JobStatusCache, ScheduleService};

    async fn state_with_job() -> (AppState, Uuid) {
        let pipelines = Arc::new(PipelineConfigRepository::new());
        pipelines
            .save(
                PipelineConfig::new("studios", vec![MaterialConfig::git("url")]).with_stage(
                    StageConfig::new("mingle", vec![JobConfig::new("unit").with_resources(["linux"])]),
                ),
            )
            .await
            .unwrap();

        let schedule = Arc::new(ScheduleService::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::clone(&pipelines),
            Arc::new(JobStatusCache::new()),
        ));
        let jobs = schedule.schedule_stage("studios", 1, None, None).await.unwrap();

        let state = AppState {
            schedule,
            pipelines,
            agents: Arc::new(AgentRegistry::new()),
        };
        (state, jobs[0].id)
    }

    #[tokio::test]
    async fn test_reschedule_reports_outcome() {
        let (state, id) = state_with_job().await;

        let Json(first) = reschedule_job(State(state.clone()), Path(id)).await.unwrap();
        let Json(second) = reschedule_job(State(state.clone()), Path(id)).await.unwrap();

        assert!(first.rescheduled);
        let new_job = first.new_job.unwrap();
        assert_eq!(new_job.state, JobState::Scheduled);
        assert!(!second.rescheduled);
        assert_eq!(
            second.reason.as_deref(),
            Some("job has already been rescheduled")
        );

        let Json(builds) = list_scheduled_builds(State(state)).await.unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].job_id, new_job.id);
        assert_eq!(builds[0].resources, vec!["linux".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (state, _) = state_with_job().await;

        let result = get_job(State(state), Path(Uuid::new_v4())).await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_through_handlers() {
        let (state, id) = state_with_job().await;

        let assign = AssignJob {
            agent_uuid: "agent-1".to_string(),
        };
        let Json(job) = assign_job(State(state.clone()), Path(id), Json(assign))
            .await
            .unwrap();
        assert_eq!(job.state, JobState::Assigned);

        let again = AssignJob {
            agent_uuid: "agent-2".to_string(),
        };
        let result = assign_job(State(state.clone()), Path(id), Json(again)).await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));

        let complete = CompleteJob {
            result: JobResult::Passed,
        };
        complete_job(State(state.clone()), Path(id), Json(complete))
            .await
            .unwrap();

        let Json(current) = current_job(
            State(state),
            Path(("Studios".to_string(), "Mingle".to_string(), "Unit".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(current.id, id);
        assert_eq!(current.result, JobResult::Passed);
    }
}
