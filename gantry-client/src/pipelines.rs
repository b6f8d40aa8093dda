//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use gantry_core::domain::pipeline::PipelineConfig;
use gantry_core::dto::job::JobSummary;
use gantry_core::dto::pipeline::{
    PipelineMaterials, PipelineSummary, QueueEntrySummary, SchedulePipeline,
};

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Configuration
    // =============================================================================

    /// Create or replace a pipeline
    ///
    /// Rejected when an upstream pipeline is unknown or the dependencies
    /// would form a cycle.
    pub async fn create_pipeline(&self, pipeline: &PipelineConfig) -> Result<PipelineSummary> {
        let url = self.api_url("pipeline/create");
        let response = self.client.post(&url).json(pipeline).send().await?;

        self.handle_response(response).await
    }

    /// List all pipelines
    pub async fn list_pipelines(&self) -> Result<Vec<PipelineSummary>> {
        let url = self.api_url("pipeline/list");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get a pipeline configuration by name
    pub async fn get_pipeline(&self, name: &str) -> Result<PipelineConfig> {
        let url = self.api_url(&format!("pipeline/{}", name));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Dependency Analysis
    // =============================================================================

    /// Upstream build queue of a pipeline, one entry per path
    pub async fn build_queue(&self, name: &str) -> Result<Vec<QueueEntrySummary>> {
        let url = self.api_url(&format!("pipeline/{}/queue", name));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Unshared materials and graph fingerprints of a pipeline
    pub async fn pipeline_materials(&self, name: &str) -> Result<PipelineMaterials> {
        let url = self.api_url(&format!("pipeline/{}/materials", name));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Scheduling
    // =============================================================================

    /// Schedule a stage of a pipeline run
    pub async fn schedule_pipeline(
        &self,
        name: &str,
        req: &SchedulePipeline,
    ) -> Result<Vec<JobSummary>> {
        let url = self.api_url(&format!("pipeline/{}/schedule", name));
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }
}
