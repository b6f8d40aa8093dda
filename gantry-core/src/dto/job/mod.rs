//! Job DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{JobInstance, JobPlan, JobResult, JobState};
use crate::domain::pipeline::ArtifactType;

/// Summary information about a job instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    /// `pipeline/counter/stage/stageCounter/job`
    pub locator: String,
    pub pipeline_name: String,
    pub stage_name: String,
    pub job_name: String,
    pub state: JobState,
    pub result: JobResult,
    pub agent_uuid: Option<String>,
    pub ignored: bool,
    pub schedule_order: i64,
    pub scheduled_at: DateTime<Utc>,
}

impl From<&JobInstance> for JobSummary {
    fn from(job: &JobInstance) -> Self {
        JobSummary {
            id: job.id,
            locator: job.identifier.build_locator(),
            pipeline_name: job.identifier.pipeline_name.clone(),
            stage_name: job.identifier.stage_name.clone(),
            job_name: job.identifier.job_name.clone(),
            state: job.state,
            result: job.result,
            agent_uuid: job.agent_uuid.clone(),
            ignored: job.ignored,
            schedule_order: job.schedule_order,
            scheduled_at: job.scheduled_at,
        }
    }
}

/// Outcome of a reschedule request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleResponse {
    pub job_id: Uuid,
    pub rescheduled: bool,
    /// The replacement instance, when one was created
    pub new_job: Option<JobSummary>,
    /// Why nothing happened, when nothing did
    pub reason: Option<String>,
}

/// Request to hand a job to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignJob {
    pub agent_uuid: String,
}

/// State reported for a job by its agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateJobState {
    pub state: JobState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteJob {
    pub result: JobResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub artifact_type: ArtifactType,
    pub src: String,
    pub dest: String,
}

/// A job waiting for an agent, with what it needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledBuild {
    pub job_id: Uuid,
    pub locator: String,
    pub resources: Vec<String>,
    pub artifacts: Vec<ArtifactSummary>,
}

impl From<&JobPlan> for ScheduledBuild {
    fn from(plan: &JobPlan) -> Self {
        ScheduledBuild {
            job_id: plan.job_id,
            locator: plan.identifier.build_locator(),
            resources: plan.resource_names().map(str::to_string).collect(),
            artifacts: plan
                .artifact_plans
                .iter()
                .map(|artifact| ArtifactSummary {
                    artifact_type: artifact.artifact_type,
                    src: artifact.src.clone(),
                    dest: artifact.dest.clone(),
                })
                .collect(),
        }
    }
}
