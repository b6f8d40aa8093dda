//! Job-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use gantry_core::domain::job::{JobResult, JobState};
use gantry_core::dto::job::{
    AssignJob, CompleteJob, JobSummary, RescheduleResponse, ScheduledBuild, UpdateJobState,
};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Job Queries
    // =============================================================================

    /// Get a job by ID
    pub async fn get_job(&self, job_id: Uuid) -> Result<JobSummary> {
        let url = self.api_url(&format!("job/{}", job_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Jobs waiting for an agent, in scheduling order
    pub async fn list_scheduled_builds(&self) -> Result<Vec<ScheduledBuild>> {
        let url = self.api_url("job/list/scheduled");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Latest instance of a configured job
    pub async fn current_job(&self, pipeline: &str, stage: &str, job: &str) -> Result<JobSummary> {
        let url = self.api_url(&format!("job/status/{}/{}/{}", pipeline, stage, job));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Replace a hung job with a fresh scheduled instance
    ///
    /// Completed and already rescheduled jobs are reported, not replaced.
    pub async fn reschedule_job(&self, job_id: Uuid) -> Result<RescheduleResponse> {
        let url = self.api_url(&format!("job/{}/reschedule", job_id));
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Hand a scheduled job to an agent
    pub async fn assign_job(&self, job_id: Uuid, agent_uuid: &str) -> Result<JobSummary> {
        let url = self.api_url(&format!("job/{}/assign", job_id));
        let response = self
            .client
            .post(&url)
            .json(&AssignJob {
                agent_uuid: agent_uuid.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Report the state of a job
    pub async fn update_job_state(&self, job_id: Uuid, state: JobState) -> Result<JobSummary> {
        let url = self.api_url(&format!("job/{}/state", job_id));
        let response = self
            .client
            .post(&url)
            .json(&UpdateJobState { state })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Complete a job with its result
    pub async fn complete_job(&self, job_id: Uuid, result: JobResult) -> Result<JobSummary> {
        let url = self.api_url(&format!("job/{}/complete", job_id));
        let response = self
            .client
            .post(&url)
            .json(&CompleteJob { result })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel a job that has not completed yet
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<JobSummary> {
        let url = self.api_url(&format!("job/{}/cancel", job_id));
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }
}
