//! Agent API Handlers
//!
//! HTTP endpoints for agent pings and listing.

use axum::{Json, extract::State};
use gantry_core::domain::agent::{AgentRuntimeInfo, AgentRuntimeStatus};
use gantry_core::dto::agent::{AgentSummary, PingResponse};

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /api/agent/ping
/// Record an agent's runtime snapshot
///
/// An idle agent still holding unfinished jobs has lost them; those jobs
/// are rescheduled.
pub async fn ping(
    State(state): State<AppState>,
    Json(req): Json<AgentRuntimeInfo>,
) -> ApiResult<Json<PingResponse>> {
    tracing::debug!("Ping from {}", req.agent_info_debug_string());

    let info = state.agents.ping(req).await?;

    let rescheduled_jobs = if info.runtime_status == AgentRuntimeStatus::Idle {
        state.schedule.reschedule_abandoned_builds(info.uuid()).await?
    } else {
        Vec::new()
    };

    Ok(Json(PingResponse {
        status: info.runtime_status,
        rescheduled_jobs,
    }))
}

/// GET /api/agent/list
/// List all known agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentSummary>> {
    tracing::debug!("Listing all agents");

    let agents = state.agents.list().await;
    Json(agents.iter().map(AgentSummary::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gantry_core::domain::agent::AgentIdentifier;
    use gantry_core::domain::job::JobState;
    use gantry_core::domain::material::MaterialConfig;
    use gantry_core::domain::pipeline::{JobConfig, PipelineConfig, StageConfig};

    use crate::api::error::ApiError;
    use crate::repository::{InMemoryJobStore, PipelineConfigRepository};
    use crate::service::{AgentRegistry, JobStatusCache, ScheduleService};

    fn report(status: AgentRuntimeStatus, cookie: &str) -> AgentRuntimeInfo {
        let mut info = AgentRuntimeInfo::from_server(
            AgentIdentifier::new("build-01", "10.0.0.5", "agent-1"),
            true,
            "/var/lib/agent",
            Some(4096),
            Some("Linux"),
        )
        .unwrap();
        info.runtime_status = status;
        info.cookie = Some(cookie.to_string());
        info
    }

    async fn state() -> AppState {
        let pipelines = Arc::new(PipelineConfigRepository::new());
        pipelines
            .save(
                PipelineConfig::new("studios", vec![MaterialConfig::git("url")])
                    .with_stage(StageConfig::new("mingle", vec![JobConfig::new("unit")])),
            )
            .await
            .unwrap();

        AppState {
            schedule: Arc::new(ScheduleService::new(
                Arc::new(InMemoryJobStore::new()),
                Arc::clone(&pipelines),
                Arc::new(JobStatusCache::new()),
            )),
            pipelines,
            agents: Arc::new(AgentRegistry::new()),
        }
    }

    #[tokio::test]
    async fn test_idle_ping_reschedules_assigned_jobs() {
        let state = state().await;
        let jobs = state
            .schedule
            .schedule_stage("studios", 1, None, None)
            .await
            .unwrap();
        let job_id = jobs[0].id;

        ping(State(state.clone()), Json(report(AgentRuntimeStatus::Building, "c1")))
            .await
            .unwrap();
        state.schedule.assign_job(job_id, "agent-1").await.unwrap();
        state
            .schedule
            .update_job_state(job_id, JobState::Building)
            .await
            .unwrap();

        let Json(response) = ping(State(state.clone()), Json(report(AgentRuntimeStatus::Idle, "c1")))
            .await
            .unwrap();

        assert_eq!(response.status, AgentRuntimeStatus::Idle);
        assert_eq!(response.rescheduled_jobs, vec![job_id]);
        let old = state.schedule.find_job(job_id).await.unwrap();
        assert_eq!(old.state, JobState::Rescheduled);
    }

    #[tokio::test]
    async fn test_ping_with_other_cookie_conflicts() {
        let state = state().await;
        ping(State(state.clone()), Json(report(AgentRuntimeStatus::Idle, "c1")))
            .await
            .unwrap();

        let result = ping(State(state.clone()), Json(report(AgentRuntimeStatus::Idle, "c2"))).await;

        assert!(matches!(result, Err(ApiError::Conflict(_))));
        let Json(agents) = list_agents(State(state)).await;
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].uuid, "agent-1");
    }
}
