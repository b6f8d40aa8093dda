//! Job domain types
//!
//! A job instance is one attempt at running a configured job. Its lifecycle
//! is recorded as an append-only list of state transitions. Transitions are
//! not validated: agents report out of order, and the last report wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pipeline::{ArtifactType, JobConfig, PipelineIdentifier};

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Scheduled,
    Assigned,
    Preparing,
    Building,
    Completing,
    Completed,
    Rescheduled,
    Unknown,
}

impl JobState {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobState::Scheduled
                | JobState::Assigned
                | JobState::Preparing
                | JobState::Building
                | JobState::Completing
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Scheduled => "Scheduled",
            JobState::Assigned => "Assigned",
            JobState::Preparing => "Preparing",
            JobState::Building => "Building",
            JobState::Completing => "Completing",
            JobState::Completed => "Completed",
            JobState::Rescheduled => "Rescheduled",
            JobState::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(JobState::Scheduled),
            "Assigned" => Ok(JobState::Assigned),
            "Preparing" => Ok(JobState::Preparing),
            "Building" => Ok(JobState::Building),
            "Completing" => Ok(JobState::Completing),
            "Completed" => Ok(JobState::Completed),
            "Rescheduled" => Ok(JobState::Rescheduled),
            "Unknown" => Ok(JobState::Unknown),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// Outcome of a completed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobResult {
    Unknown,
    Passed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for JobResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobResult::Unknown => write!(f, "Unknown"),
            JobResult::Passed => write!(f, "Passed"),
            JobResult::Failed => write!(f, "Failed"),
            JobResult::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::str::FromStr for JobResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" => Ok(JobResult::Unknown),
            "Passed" => Ok(JobResult::Passed),
            "Failed" => Ok(JobResult::Failed),
            "Cancelled" => Ok(JobResult::Cancelled),
            other => Err(format!("unknown job result: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStateTransition {
    pub state: JobState,
    pub changed_at: DateTime<Utc>,
}

// =============================================================================
// Identifiers
// =============================================================================

/// Locates a job instance within a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobIdentifier {
    pub pipeline_name: String,
    pub pipeline_counter: i64,
    pub pipeline_label: String,
    pub stage_name: String,
    pub stage_counter: i64,
    pub job_name: String,
}

impl JobIdentifier {
    pub fn new(
        pipeline: &PipelineIdentifier,
        stage_name: impl Into<String>,
        stage_counter: i64,
        job_name: impl Into<String>,
    ) -> Self {
        Self {
            pipeline_name: pipeline.name.clone(),
            pipeline_counter: pipeline.counter,
            pipeline_label: pipeline.label.clone(),
            stage_name: stage_name.into(),
            stage_counter,
            job_name: job_name.into(),
        }
    }

    pub fn pipeline_identifier(&self) -> PipelineIdentifier {
        PipelineIdentifier::new(
            self.pipeline_name.clone(),
            self.pipeline_counter,
            self.pipeline_label.clone(),
        )
    }

    /// Identity of the configured job, shared by every run of it
    pub fn job_config_identifier(&self) -> JobConfigIdentifier {
        JobConfigIdentifier::new(&self.pipeline_name, &self.stage_name, &self.job_name)
    }

    pub fn stage_locator(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.pipeline_name, self.pipeline_counter, self.stage_name, self.stage_counter
        )
    }

    pub fn build_locator(&self) -> String {
        format!("{}/{}", self.stage_locator(), self.job_name)
    }
}

impl std::fmt::Display for JobIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.pipeline_name,
            self.pipeline_label,
            self.stage_name,
            self.stage_counter,
            self.job_name
        )
    }
}

/// `(pipeline, stage, job)` names, lowercased
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobConfigIdentifier {
    pub pipeline_name: String,
    pub stage_name: String,
    pub job_name: String,
}

impl JobConfigIdentifier {
    pub fn new(pipeline_name: &str, stage_name: &str, job_name: &str) -> Self {
        Self {
            pipeline_name: pipeline_name.to_lowercase(),
            stage_name: stage_name.to_lowercase(),
            job_name: job_name.to_lowercase(),
        }
    }
}

// =============================================================================
// Job Instance
// =============================================================================

/// Job execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: Uuid,
    pub identifier: JobIdentifier,
    pub state: JobState,
    pub result: JobResult,
    pub agent_uuid: Option<String>,
    /// Ignored instances were replaced by a reschedule and take no further
    /// part in scheduling
    pub ignored: bool,
    /// Ordering key among scheduled jobs
    pub schedule_order: i64,
    pub scheduled_at: DateTime<Utc>,
    pub transitions: Vec<JobStateTransition>,
}

impl JobInstance {
    /// A freshly scheduled instance
    pub fn scheduled(
        id: Uuid,
        identifier: JobIdentifier,
        schedule_order: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            identifier,
            state: JobState::Scheduled,
            result: JobResult::Unknown,
            agent_uuid: None,
            ignored: false,
            schedule_order,
            scheduled_at: at,
            transitions: vec![JobStateTransition {
                state: JobState::Scheduled,
                changed_at: at,
            }],
        }
    }

    /// Records a state change. No transition guard is applied.
    pub fn change_state(&mut self, state: JobState, at: DateTime<Utc>) {
        self.state = state;
        self.transitions.push(JobStateTransition {
            state,
            changed_at: at,
        });
    }

    pub fn assign(&mut self, agent_uuid: impl Into<String>, at: DateTime<Utc>) {
        self.agent_uuid = Some(agent_uuid.into());
        self.change_state(JobState::Assigned, at);
    }

    pub fn complete(&mut self, result: JobResult, at: DateTime<Utc>) {
        self.result = result;
        self.change_state(JobState::Completed, at);
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) {
        self.complete(JobResult::Cancelled, at);
    }

    pub fn ignore(&mut self) {
        self.ignored = true;
    }

    /// A new scheduled instance of the same configured job
    ///
    /// The copy starts over: no agent, no result, a single Scheduled
    /// transition.
    pub fn reschedule_copy(&self, new_id: Uuid, schedule_order: i64, at: DateTime<Utc>) -> Self {
        Self::scheduled(new_id, self.identifier.clone(), schedule_order, at)
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn is_rescheduled(&self) -> bool {
        self.state == JobState::Rescheduled
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn has_passed(&self) -> bool {
        self.is_completed() && self.result == JobResult::Passed
    }

    pub fn has_unsuccessfully_completed(&self) -> bool {
        self.is_completed() && matches!(self.result, JobResult::Failed | JobResult::Cancelled)
    }

    pub fn is_assigned_to(&self, agent_uuid: &str) -> bool {
        self.agent_uuid.as_deref() == Some(agent_uuid)
    }

    /// When the job last entered `state`
    pub fn transition_time(&self, state: JobState) -> Option<DateTime<Utc>> {
        self.transitions
            .iter()
            .rev()
            .find(|transition| transition.state == state)
            .map(|transition| transition.changed_at)
    }
}

// =============================================================================
// Job Plan
// =============================================================================

/// Resource (capability tag) row owned by a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub job_id: Uuid,
    pub name: String,
}

/// Artifact declaration row owned by a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPlan {
    pub id: Uuid,
    pub job_id: Uuid,
    pub artifact_type: ArtifactType,
    pub src: String,
    pub dest: String,
}

/// Resolved resources and artifacts of a scheduled job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPlan {
    pub job_id: Uuid,
    pub identifier: JobIdentifier,
    pub resources: Vec<Resource>,
    pub artifact_plans: Vec<ArtifactPlan>,
}

impl JobPlan {
    /// Plan for a job about to be scheduled from its configuration
    pub fn from_config(job_id: Uuid, identifier: JobIdentifier, config: &JobConfig) -> Self {
        let resources = config
            .resources
            .iter()
            .map(|name| Resource {
                id: Uuid::new_v4(),
                job_id,
                name: name.clone(),
            })
            .collect();

        let artifact_plans = config
            .artifacts
            .iter()
            .map(|artifact| ArtifactPlan {
                id: Uuid::new_v4(),
                job_id,
                artifact_type: artifact.artifact_type,
                src: artifact.src.clone(),
                dest: artifact.dest.clone(),
            })
            .collect();

        Self {
            job_id,
            identifier,
            resources,
            artifact_plans,
        }
    }

    /// The same plan owned by another job
    ///
    /// Every row gets a fresh id; names, sources, destinations and types are
    /// kept in order.
    pub fn copy_to(&self, job_id: Uuid) -> Self {
        Self {
            job_id,
            identifier: self.identifier.clone(),
            resources: self
                .resources
                .iter()
                .map(|resource| Resource {
                    id: Uuid::new_v4(),
                    job_id,
                    name: resource.name.clone(),
                })
                .collect(),
            artifact_plans: self
                .artifact_plans
                .iter()
                .map(|plan| ArtifactPlan {
                    id: Uuid::new_v4(),
                    job_id,
                    artifact_type: plan.artifact_type,
                    src: plan.src.clone(),
                    dest: plan.dest.clone(),
                })
                .collect(),
        }
    }

    /// Compares resources and artifact plans ignoring row and job ids
    pub fn same_content_as(&self, other: &JobPlan) -> bool {
        let resources = |plan: &JobPlan| -> Vec<String> {
            plan.resources.iter().map(|r| r.name.clone()).collect()
        };
        let artifacts = |plan: &JobPlan| -> Vec<(ArtifactType, String, String)> {
            plan.artifact_plans
                .iter()
                .map(|a| (a.artifact_type, a.src.clone(), a.dest.clone()))
                .collect()
        };

        resources(self) == resources(other) && artifacts(self) == artifacts(other)
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|resource| resource.name.as_str())
    }
}
