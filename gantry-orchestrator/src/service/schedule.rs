//! Schedule Service
//!
//! Business logic for scheduling job instances and moving them through their
//! lifecycle. Every mutation runs in a single store transaction, and the job
//! status cache is updated only once that transaction has committed.
//!
//! Rescheduling replaces a hung job: the old instance is marked Rescheduled
//! and ignored, and a new Scheduled instance takes over a copy of its plan.
//! Reschedules of the same stage are serialized by a per-stage lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use gantry_core::counter::TimeStampBasedCounter;
use gantry_core::domain::job::{
    JobConfigIdentifier, JobIdentifier, JobInstance, JobPlan, JobResult, JobState,
};
use gantry_core::domain::pipeline::PipelineIdentifier;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::repository::{JobStore, JobTransaction, PipelineConfigRepository, StoreError};
use crate::service::job_status_cache::JobStatusCache;

/// Service error type
#[derive(Debug)]
pub enum ScheduleError {
    JobNotFound(Uuid),
    PipelineNotFound(String),
    StageNotFound { pipeline: String, stage: String },
    InvalidState(String),
    Store(StoreError),
}

impl From<StoreError> for ScheduleError {
    fn from(err: StoreError) -> Self {
        ScheduleError::Store(err)
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Why a reschedule request left the job alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotRescheduledReason {
    AlreadyCompleted,
    AlreadyRescheduled,
}

impl std::fmt::Display for NotRescheduledReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotRescheduledReason::AlreadyCompleted => write!(f, "job has already completed"),
            NotRescheduledReason::AlreadyRescheduled => {
                write!(f, "job has already been rescheduled")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescheduleOutcome {
    Rescheduled { new_job: JobInstance },
    NotRescheduled(NotRescheduledReason),
}

pub struct ScheduleService {
    store: Arc<dyn JobStore>,
    pipelines: Arc<PipelineConfigRepository>,
    cache: Arc<JobStatusCache>,
    counter: TimeStampBasedCounter,
    stage_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ScheduleService {
    pub fn new(
        store: Arc<dyn JobStore>,
        pipelines: Arc<PipelineConfigRepository>,
        cache: Arc<JobStatusCache>,
    ) -> Self {
        Self {
            store,
            pipelines,
            cache,
            counter: TimeStampBasedCounter::default(),
            stage_locks: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Rescheduling
    // =========================================================================

    /// Replace a job instance with a fresh Scheduled one
    ///
    /// Completed and already rescheduled jobs are left untouched. On any
    /// store error nothing is written.
    pub async fn reschedule_job(&self, job_id: Uuid) -> Result<RescheduleOutcome> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or(ScheduleError::JobNotFound(job_id))?;

        let lock = self.stage_lock(&job.identifier).await;
        let _guard = lock.lock().await;

        let mut tx = self.store.begin().await?;
        let outcome = self.reschedule_in(tx.as_mut(), job_id).await?;

        if let RescheduleOutcome::Rescheduled { new_job } = &outcome {
            tx.commit().await?;
            self.cache.update(new_job).await;
            tracing::info!(
                "Job {} rescheduled as {} ({})",
                job_id,
                new_job.id,
                new_job.identifier.build_locator()
            );
        }

        Ok(outcome)
    }

    async fn reschedule_in(
        &self,
        tx: &mut dyn JobTransaction,
        job_id: Uuid,
    ) -> Result<RescheduleOutcome> {
        let mut old_job = tx
            .find_job(job_id)
            .await?
            .ok_or(ScheduleError::JobNotFound(job_id))?;

        if old_job.is_completed() {
            tracing::info!("Not rescheduling job {}: already completed", job_id);
            return Ok(RescheduleOutcome::NotRescheduled(
                NotRescheduledReason::AlreadyCompleted,
            ));
        }
        if old_job.is_ignored() || old_job.is_rescheduled() {
            tracing::info!("Not rescheduling job {}: already rescheduled", job_id);
            return Ok(RescheduleOutcome::NotRescheduled(
                NotRescheduledReason::AlreadyRescheduled,
            ));
        }

        let now = Utc::now();
        old_job.change_state(JobState::Rescheduled, now);
        old_job.ignore();
        tx.update_job(&old_job).await?;

        let new_job = old_job.reschedule_copy(Uuid::new_v4(), self.counter.next(), now);
        tx.insert_job(&new_job).await?;

        match tx.load_plan(old_job.id).await? {
            Some(plan) => tx.insert_plan(&plan.copy_to(new_job.id)).await?,
            None => tracing::warn!("Job {} has no plan to copy", old_job.id),
        }

        Ok(RescheduleOutcome::Rescheduled { new_job })
    }

    /// Reschedule every unfinished job still assigned to an agent that
    /// reports itself idle
    ///
    /// Returns the ids of the replaced jobs.
    pub async fn reschedule_abandoned_builds(&self, agent_uuid: &str) -> Result<Vec<Uuid>> {
        let abandoned = {
            let mut tx = self.store.begin().await?;
            tx.active_jobs_for_agent(agent_uuid).await?
        };

        let mut rescheduled = Vec::new();
        for job in abandoned {
            tracing::warn!(
                "Agent {} is idle but job {} is still assigned to it",
                agent_uuid,
                job.identifier.build_locator()
            );
            if let RescheduleOutcome::Rescheduled { .. } = self.reschedule_job(job.id).await? {
                rescheduled.push(job.id);
            }
        }

        Ok(rescheduled)
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Schedule every job of a stage for a pipeline run
    ///
    /// The stage defaults to the pipeline's first stage and the label to the
    /// counter. Scheduling the same stage of the same run again creates its
    /// next stage counter.
    pub async fn schedule_stage(
        &self,
        pipeline_name: &str,
        pipeline_counter: i64,
        label: Option<&str>,
        stage_name: Option<&str>,
    ) -> Result<Vec<JobInstance>> {
        let pipeline = self
            .pipelines
            .find(pipeline_name)
            .await
            .ok_or_else(|| ScheduleError::PipelineNotFound(pipeline_name.to_string()))?;

        let stage = match stage_name {
            Some(name) => pipeline.find_stage(name),
            None => pipeline.first_stage(),
        }
        .ok_or_else(|| ScheduleError::StageNotFound {
            pipeline: pipeline.name.clone(),
            stage: stage_name.unwrap_or_default().to_string(),
        })?;

        let pipeline_identifier = PipelineIdentifier::new(
            pipeline.name.clone(),
            pipeline_counter,
            label
                .map(str::to_string)
                .unwrap_or_else(|| pipeline_counter.to_string()),
        );

        let probe = JobIdentifier::new(&pipeline_identifier, stage.name.clone(), 0, "");
        let lock = self.stage_lock(&probe).await;
        let _guard = lock.lock().await;

        let mut tx = self.store.begin().await?;
        let stage_counter = tx
            .max_stage_counter(&pipeline.name, pipeline_counter, &stage.name)
            .await?
            .unwrap_or(0)
            + 1;

        let now = Utc::now();
        let mut jobs = Vec::with_capacity(stage.jobs.len());
        for job_config in &stage.jobs {
            let identifier = JobIdentifier::new(
                &pipeline_identifier,
                stage.name.clone(),
                stage_counter,
                job_config.name.clone(),
            );
            let job =
                JobInstance::scheduled(Uuid::new_v4(), identifier.clone(), self.counter.next(), now);

            tx.insert_job(&job).await?;
            tx.insert_plan(&JobPlan::from_config(job.id, identifier, job_config))
                .await?;
            jobs.push(job);
        }
        tx.commit().await?;

        for job in &jobs {
            self.cache.update(job).await;
        }

        tracing::info!(
            "Scheduled {} jobs for {}/{}/{}",
            jobs.len(),
            pipeline_identifier.pipeline_locator(),
            stage.name,
            stage_counter
        );

        Ok(jobs)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Hand a scheduled job to an agent
    pub async fn assign_job(&self, job_id: Uuid, agent_uuid: &str) -> Result<JobInstance> {
        let agent_uuid = agent_uuid.to_string();
        let job = self
            .mutate_job(job_id, move |job| {
                if job.ignored || job.state != JobState::Scheduled {
                    return Err(ScheduleError::InvalidState(format!(
                        "Job {} is not waiting for an agent (current: {})",
                        job.id, job.state
                    )));
                }
                job.assign(agent_uuid, Utc::now());
                Ok(true)
            })
            .await?;

        tracing::info!("Job {} assigned to agent {:?}", job_id, job.agent_uuid);
        Ok(job)
    }

    /// Record a state reported by an agent
    ///
    /// Any state except Rescheduled is accepted in any order.
    pub async fn update_job_state(&self, job_id: Uuid, state: JobState) -> Result<JobInstance> {
        if state == JobState::Rescheduled {
            return Err(ScheduleError::InvalidState(format!(
                "Job {} can only be rescheduled through a reschedule request",
                job_id
            )));
        }

        let job = self
            .mutate_job(job_id, move |job| {
                job.change_state(state, Utc::now());
                Ok(true)
            })
            .await?;

        tracing::debug!("Job {} is now {}", job_id, state);
        Ok(job)
    }

    /// Complete a job with its result; a completed job keeps its first result
    pub async fn complete_job(&self, job_id: Uuid, result: JobResult) -> Result<JobInstance> {
        let job = self
            .mutate_job(job_id, move |job| {
                if job.is_completed() {
                    tracing::warn!("Job {} already completed as {}", job.id, job.result);
                    return Ok(false);
                }
                job.complete(result, Utc::now());
                Ok(true)
            })
            .await?;

        tracing::info!("Job {} completed with result: {}", job_id, job.result);
        Ok(job)
    }

    /// Cancel a job; completed and rescheduled jobs are left as they are
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<JobInstance> {
        self.mutate_job(job_id, |job| {
            if job.is_completed() || job.is_rescheduled() {
                return Ok(false);
            }
            job.cancel(Utc::now());
            tracing::info!("Job {} cancelled", job.id);
            Ok(true)
        })
        .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn find_job(&self, job_id: Uuid) -> Result<JobInstance> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or(ScheduleError::JobNotFound(job_id))
    }

    /// Plans of the jobs waiting for an agent, oldest first
    pub async fn ordered_scheduled_builds(&self) -> Result<Vec<JobPlan>> {
        Ok(self.store.ordered_scheduled_builds().await?)
    }

    /// Latest instance of a configured job
    pub async fn current_job(
        &self,
        pipeline_name: &str,
        stage_name: &str,
        job_name: &str,
    ) -> Option<JobInstance> {
        self.cache
            .current(&JobConfigIdentifier::new(pipeline_name, stage_name, job_name))
            .await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Load, change and store a job in one transaction
    ///
    /// `mutate` returns whether it changed the job; unchanged jobs are not
    /// written.
    async fn mutate_job<F>(&self, job_id: Uuid, mutate: F) -> Result<JobInstance>
    where
        F: FnOnce(&mut JobInstance) -> Result<bool> + Send,
    {
        let mut tx = self.store.begin().await?;
        let mut job = tx
            .find_job(job_id)
            .await?
            .ok_or(ScheduleError::JobNotFound(job_id))?;

        if !mutate(&mut job)? {
            return Ok(job);
        }

        tx.update_job(&job).await?;
        tx.commit().await?;
        self.cache.update(&job).await;

        Ok(job)
    }

    async fn stage_lock(&self, identifier: &JobIdentifier) -> Arc<Mutex<()>> {
        let key = format!(
            "{}/{}/{}",
            identifier.pipeline_name.to_lowercase(),
            identifier.pipeline_counter,
            identifier.stage_name.to_lowercase()
        );

        let mut locks = self.stage_locks.lock().await;
        Arc::clone(locks.entry(key).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryJobStore;
    use gantry_core::domain::material::MaterialConfig;
    use gantry_core::domain::pipeline::{ArtifactConfig, JobConfig, PipelineConfig, StageConfig};

    struct Fixture {
        store: InMemoryJobStore,
        cache: Arc<JobStatusCache>,
        service: Arc<ScheduleService>,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryJobStore::new();
        let pipelines = Arc::new(PipelineConfigRepository::new());
        let cache = Arc::new(JobStatusCache::new());

        pipelines
            .save(
                PipelineConfig::new("studios", vec![MaterialConfig::git("url")]).with_stage(
                    StageConfig::new(
                        "mingle",
                        vec![
                            JobConfig::new("unit")
                                .with_resources(["r1", "r2"])
                                .with_artifact(ArtifactConfig::build("s1", "d1"))
                                .with_artifact(ArtifactConfig::test("s2", "d2")),
                        ],
                    ),
                ),
            )
            .await
            .unwrap();

        let service = Arc::new(ScheduleService::new(
            Arc::new(store.clone()),
            pipelines,
            Arc::clone(&cache),
        ));

        Fixture {
            store,
            cache,
            service,
        }
    }

    async fn schedule_one(fixture: &Fixture) -> JobInstance {
        let mut jobs = fixture
            .service
            .schedule_stage("studios", 1, None, None)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        jobs.remove(0)
    }

    async fn plan_of(store: &InMemoryJobStore, job_id: Uuid) -> JobPlan {
        let mut tx = store.begin().await.unwrap();
        tx.load_plan(job_id).await.unwrap().unwrap()
    }

    fn key() -> JobConfigIdentifier {
        JobConfigIdentifier::new("studios", "mingle", "unit")
    }

    #[tokio::test]
    async fn test_reschedule_replaces_job_and_copies_plan() {
        let fixture = fixture().await;
        let old_job = schedule_one(&fixture).await;
        fixture.service.assign_job(old_job.id, "agent-1").await.unwrap();
        fixture
            .service
            .update_job_state(old_job.id, JobState::Building)
            .await
            .unwrap();

        let outcome = fixture.service.reschedule_job(old_job.id).await.unwrap();
        let RescheduleOutcome::Rescheduled { new_job } = outcome else {
            panic!("expected a reschedule, got {outcome:?}");
        };

        let reloaded = fixture.service.find_job(old_job.id).await.unwrap();
        assert_eq!(reloaded.state, JobState::Rescheduled);
        assert!(reloaded.is_ignored());

        assert_eq!(new_job.state, JobState::Scheduled);
        assert_eq!(new_job.identifier, old_job.identifier);
        assert_eq!(new_job.agent_uuid, None);
        assert!(new_job.schedule_order > old_job.schedule_order);

        let old_plan = plan_of(&fixture.store, old_job.id).await;
        let new_plan = plan_of(&fixture.store, new_job.id).await;
        assert_eq!(new_plan.resources.len(), 2);
        assert_eq!(new_plan.artifact_plans.len(), 2);
        assert!(new_plan.same_content_as(&old_plan));
        for (new, old) in new_plan.resources.iter().zip(&old_plan.resources) {
            assert_ne!(new.id, old.id);
            assert_eq!(new.job_id, new_job.id);
        }
        for (new, old) in new_plan.artifact_plans.iter().zip(&old_plan.artifact_plans) {
            assert_ne!(new.id, old.id);
            assert_eq!(new.job_id, new_job.id);
        }

        assert_eq!(fixture.cache.current(&key()).await, Some(new_job));
    }

    #[tokio::test]
    async fn test_reschedule_twice_creates_one_new_job() {
        let fixture = fixture().await;
        let old_job = schedule_one(&fixture).await;

        let first = fixture.service.reschedule_job(old_job.id).await.unwrap();
        let second = fixture.service.reschedule_job(old_job.id).await.unwrap();

        assert!(matches!(first, RescheduleOutcome::Rescheduled { .. }));
        assert_eq!(
            second,
            RescheduleOutcome::NotRescheduled(NotRescheduledReason::AlreadyRescheduled)
        );

        let jobs = fixture.store.all_jobs().await;
        assert_eq!(jobs.len(), 2);
        let scheduled: Vec<_> = jobs
            .iter()
            .filter(|job| job.state == JobState::Scheduled && !job.ignored)
            .collect();
        assert_eq!(scheduled.len(), 1);

        let builds = fixture.service.ordered_scheduled_builds().await.unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].resources.len(), 2);
    }

    #[tokio::test]
    async fn test_late_state_report_does_not_revive_replaced_job() {
        let fixture = fixture().await;
        let old_job = schedule_one(&fixture).await;

        fixture.service.reschedule_job(old_job.id).await.unwrap();
        fixture
            .service
            .update_job_state(old_job.id, JobState::Building)
            .await
            .unwrap();
        let second = fixture.service.reschedule_job(old_job.id).await.unwrap();

        assert_eq!(
            second,
            RescheduleOutcome::NotRescheduled(NotRescheduledReason::AlreadyRescheduled)
        );

        let jobs = fixture.store.all_jobs().await;
        assert_eq!(jobs.len(), 2);
        let live_scheduled = jobs
            .iter()
            .filter(|job| job.state == JobState::Scheduled && !job.ignored)
            .count();
        assert_eq!(live_scheduled, 1);
    }

    #[tokio::test]
    async fn test_concurrent_reschedules_create_one_new_job() {
        let fixture = fixture().await;
        let job_id = schedule_one(&fixture).await.id;

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let service = Arc::clone(&fixture.service);
                tokio::spawn(async move { service.reschedule_job(job_id).await })
            })
            .collect();

        let mut rescheduled = 0;
        for handle in handles {
            if let RescheduleOutcome::Rescheduled { .. } = handle.await.unwrap().unwrap() {
                rescheduled += 1;
            }
        }

        assert_eq!(rescheduled, 1);
        assert_eq!(fixture.store.all_jobs().await.len(), 2);
    }

    #[tokio::test]
    async fn test_reschedule_completed_job_is_noop() {
        let fixture = fixture().await;
        let job = schedule_one(&fixture).await;
        let completed = fixture
            .service
            .complete_job(job.id, JobResult::Passed)
            .await
            .unwrap();

        let outcome = fixture.service.reschedule_job(job.id).await.unwrap();

        assert_eq!(
            outcome,
            RescheduleOutcome::NotRescheduled(NotRescheduledReason::AlreadyCompleted)
        );
        assert_eq!(fixture.store.all_jobs().await.len(), 1);
        assert_eq!(fixture.cache.current(&key()).await, Some(completed));
    }

    #[tokio::test]
    async fn test_reschedule_unknown_job() {
        let fixture = fixture().await;
        let id = Uuid::new_v4();

        let result = fixture.service.reschedule_job(id).await;

        assert!(matches!(result, Err(ScheduleError::JobNotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_failed_reschedule_leaves_old_job_untouched() {
        let fixture = fixture().await;
        let old_job = schedule_one(&fixture).await;
        fixture.store.fail_next_plan_insert();

        let result = fixture.service.reschedule_job(old_job.id).await;

        assert!(matches!(result, Err(ScheduleError::Store(_))));
        let jobs = fixture.store.all_jobs().await;
        assert_eq!(jobs, vec![old_job.clone()]);
        assert_eq!(fixture.cache.current(&key()).await, Some(old_job));
    }

    #[tokio::test]
    async fn test_idle_agent_loses_its_jobs() {
        let fixture = fixture().await;
        let job = schedule_one(&fixture).await;
        fixture.service.assign_job(job.id, "agent-1").await.unwrap();
        fixture
            .service
            .update_job_state(job.id, JobState::Building)
            .await
            .unwrap();

        assert!(
            fixture
                .service
                .reschedule_abandoned_builds("agent-2")
                .await
                .unwrap()
                .is_empty()
        );

        let rescheduled = fixture
            .service
            .reschedule_abandoned_builds("agent-1")
            .await
            .unwrap();
        assert_eq!(rescheduled, vec![job.id]);

        let current = fixture.service.current_job("Studios", "Mingle", "Unit").await.unwrap();
        assert_ne!(current.id, job.id);
        assert_eq!(current.state, JobState::Scheduled);
        assert_eq!(current.agent_uuid, None);
    }

    #[tokio::test]
    async fn test_schedule_stage_counts_reruns() {
        let fixture = fixture().await;
        let first = schedule_one(&fixture).await;
        let rerun = fixture
            .service
            .schedule_stage("STUDIOS", 1, Some("label-1"), Some("Mingle"))
            .await
            .unwrap();

        assert_eq!(first.identifier.stage_counter, 1);
        assert_eq!(first.identifier.pipeline_label, "1");
        assert_eq!(rerun[0].identifier.stage_counter, 2);
        assert_eq!(rerun[0].identifier.pipeline_label, "label-1");
        assert_eq!(rerun[0].identifier.build_locator(), "studios/1/mingle/2/unit");

        let builds = fixture.service.ordered_scheduled_builds().await.unwrap();
        let ids: Vec<Uuid> = builds.iter().map(|plan| plan.job_id).collect();
        assert_eq!(ids, vec![first.id, rerun[0].id]);
    }

    #[tokio::test]
    async fn test_schedule_unknown_pipeline_or_stage() {
        let fixture = fixture().await;

        let result = fixture.service.schedule_stage("ghost", 1, None, None).await;
        assert!(matches!(result, Err(ScheduleError::PipelineNotFound(_))));

        let result = fixture
            .service
            .schedule_stage("studios", 1, None, Some("deploy"))
            .await;
        assert!(matches!(result, Err(ScheduleError::StageNotFound { .. })));
    }

    #[tokio::test]
    async fn test_assign_requires_scheduled_job() {
        let fixture = fixture().await;
        let job = schedule_one(&fixture).await;
        fixture.service.assign_job(job.id, "agent-1").await.unwrap();

        let result = fixture.service.assign_job(job.id, "agent-2").await;

        assert!(matches!(result, Err(ScheduleError::InvalidState(_))));
        let stored = fixture.service.find_job(job.id).await.unwrap();
        assert!(stored.is_assigned_to("agent-1"));
    }

    #[tokio::test]
    async fn test_state_updates_are_permissive() {
        let fixture = fixture().await;
        let job = schedule_one(&fixture).await;

        fixture
            .service
            .update_job_state(job.id, JobState::Completing)
            .await
            .unwrap();
        let job = fixture
            .service
            .update_job_state(job.id, JobState::Preparing)
            .await
            .unwrap();

        assert_eq!(job.state, JobState::Preparing);
        assert_eq!(job.transitions.len(), 3);

        let result = fixture
            .service
            .update_job_state(job.id, JobState::Rescheduled)
            .await;
        assert!(matches!(result, Err(ScheduleError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_cancel_is_noop_once_completed() {
        let fixture = fixture().await;
        let job = schedule_one(&fixture).await;

        let cancelled = fixture.service.cancel_job(job.id).await.unwrap();
        assert_eq!(cancelled.result, JobResult::Cancelled);
        assert!(cancelled.has_unsuccessfully_completed());

        let again = fixture.service.cancel_job(job.id).await.unwrap();
        assert_eq!(again.transitions.len(), cancelled.transitions.len());

        let completed = fixture
            .service
            .complete_job(job.id, JobResult::Passed)
            .await
            .unwrap();
        assert_eq!(completed.result, JobResult::Cancelled);
    }
}
