//! Job Store
//!
//! Persistence seam for job instances and their plans. Every mutation goes
//! through a [`JobTransaction`]: its writes become visible together on
//! [`JobTransaction::commit`], and dropping it without committing discards
//! them.

use async_trait::async_trait;
use gantry_core::domain::job::{JobInstance, JobPlan};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Transactional storage for job instances
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Opens a transaction
    async fn begin(&self) -> Result<Box<dyn JobTransaction>>;

    /// Reads a job outside any transaction
    async fn find_job(&self, id: Uuid) -> Result<Option<JobInstance>>;

    /// Plans of the non-ignored Scheduled jobs, oldest ordering key first
    async fn ordered_scheduled_builds(&self) -> Result<Vec<JobPlan>>;
}

/// Unit of work over the job store
#[async_trait]
pub trait JobTransaction: Send {
    /// Loads a job with its transition history
    async fn find_job(&mut self, id: Uuid) -> Result<Option<JobInstance>>;

    /// Loads the resources and artifact plans of a job
    async fn load_plan(&mut self, job_id: Uuid) -> Result<Option<JobPlan>>;

    /// Running, non-ignored jobs assigned to the agent
    async fn active_jobs_for_agent(&mut self, agent_uuid: &str) -> Result<Vec<JobInstance>>;

    /// Highest stage counter recorded for a stage of a pipeline run
    async fn max_stage_counter(
        &mut self,
        pipeline_name: &str,
        pipeline_counter: i64,
        stage_name: &str,
    ) -> Result<Option<i64>>;

    async fn insert_job(&mut self, job: &JobInstance) -> Result<()>;

    /// Persists state, result, agent and ignored flag, and appends any
    /// transitions not stored yet
    async fn update_job(&mut self, job: &JobInstance) -> Result<()>;

    async fn insert_plan(&mut self, plan: &JobPlan) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
