//! In-Memory Job Store
//!
//! Keeps jobs and plans in process memory. Used when no database is
//! configured and in tests. A transaction holds the store lock for its whole
//! lifetime and works on a copy of the data, which replaces the stored data
//! on commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use gantry_core::domain::job::{JobInstance, JobPlan, JobState};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{JobStore, JobTransaction, Result, StoreError};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    jobs: HashMap<Uuid, JobInstance>,
    plans: HashMap<Uuid, JobPlan>,
}

/// Job store kept in memory
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_plan_insert: Arc<AtomicBool>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `insert_plan` fail, to exercise rollbacks
    pub fn fail_next_plan_insert(&self) {
        self.fail_next_plan_insert.store(true, Ordering::SeqCst);
    }

    /// Every stored job, in scheduling order
    pub async fn all_jobs(&self) -> Vec<JobInstance> {
        let state = self.state.lock().await;
        let mut jobs: Vec<JobInstance> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.schedule_order);
        jobs
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn begin(&self) -> Result<Box<dyn JobTransaction>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = (*guard).clone();

        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            fail_next_plan_insert: Arc::clone(&self.fail_next_plan_insert),
        }))
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<JobInstance>> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn ordered_scheduled_builds(&self) -> Result<Vec<JobPlan>> {
        let state = self.state.lock().await;

        let mut scheduled: Vec<&JobInstance> = state
            .jobs
            .values()
            .filter(|job| job.state == JobState::Scheduled && !job.ignored)
            .collect();
        scheduled.sort_by_key(|job| job.schedule_order);

        Ok(scheduled
            .into_iter()
            .filter_map(|job| state.plans.get(&job.id).cloned())
            .collect())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_next_plan_insert: Arc<AtomicBool>,
}

#[async_trait]
impl JobTransaction for InMemoryTransaction {
    async fn find_job(&mut self, id: Uuid) -> Result<Option<JobInstance>> {
        Ok(self.working.jobs.get(&id).cloned())
    }

    async fn load_plan(&mut self, job_id: Uuid) -> Result<Option<JobPlan>> {
        Ok(self.working.plans.get(&job_id).cloned())
    }

    async fn active_jobs_for_agent(&mut self, agent_uuid: &str) -> Result<Vec<JobInstance>> {
        let mut jobs: Vec<JobInstance> = self
            .working
            .jobs
            .values()
            .filter(|job| job.is_assigned_to(agent_uuid) && job.is_running() && !job.ignored)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.schedule_order);
        Ok(jobs)
    }

    async fn max_stage_counter(
        &mut self,
        pipeline_name: &str,
        pipeline_counter: i64,
        stage_name: &str,
    ) -> Result<Option<i64>> {
        Ok(self
            .working
            .jobs
            .values()
            .map(|job| &job.identifier)
            .filter(|identifier| {
                identifier.pipeline_name.eq_ignore_ascii_case(pipeline_name)
                    && identifier.pipeline_counter == pipeline_counter
                    && identifier.stage_name.eq_ignore_ascii_case(stage_name)
            })
            .map(|identifier| identifier.stage_counter)
            .max())
    }

    async fn insert_job(&mut self, job: &JobInstance) -> Result<()> {
        self.working.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&mut self, job: &JobInstance) -> Result<()> {
        match self.working.jobs.get_mut(&job.id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(StoreError::Unavailable(format!(
                "job {} does not exist",
                job.id
            ))),
        }
    }

    async fn insert_plan(&mut self, plan: &JobPlan) -> Result<()> {
        if self.fail_next_plan_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected failure while inserting plan".to_string(),
            ));
        }

        self.working.plans.insert(plan.job_id, plan.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gantry_core::domain::job::JobIdentifier;
    use gantry_core::domain::pipeline::PipelineIdentifier;

    fn job(order: i64) -> JobInstance {
        let identifier = JobIdentifier::new(
            &PipelineIdentifier::new("studios", 1, "1"),
            "mingle",
            1,
            "unit",
        );
        JobInstance::scheduled(Uuid::new_v4(), identifier, order, Utc::now())
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = InMemoryJobStore::new();
        let job = job(1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_job(&job).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.find_job(job.id).await.unwrap(), Some(job));
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = InMemoryJobStore::new();
        let job = job(1);

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_job(&job).await.unwrap();
            assert!(tx.find_job(job.id).await.unwrap().is_some());
        }

        assert_eq!(store.find_job(job.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let store = InMemoryJobStore::new();
        store.fail_next_plan_insert();
        let job = job(1);
        let plan = JobPlan {
            job_id: job.id,
            identifier: job.identifier.clone(),
            resources: Vec::new(),
            artifact_plans: Vec::new(),
        };

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_plan(&plan).await.is_err());
        assert!(tx.insert_plan(&plan).await.is_ok());
    }

    #[tokio::test]
    async fn test_scheduled_builds_are_ordered() {
        let store = InMemoryJobStore::new();
        let later = job(2);
        let earlier = job(1);
        let mut ignored = job(0);
        ignored.ignore();

        let mut tx = store.begin().await.unwrap();
        for job in [&later, &earlier, &ignored] {
            tx.insert_job(job).await.unwrap();
            tx.insert_plan(&JobPlan {
                job_id: job.id,
                identifier: job.identifier.clone(),
                resources: Vec::new(),
                artifact_plans: Vec::new(),
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let ids: Vec<Uuid> = store
            .ordered_scheduled_builds()
            .await
            .unwrap()
            .iter()
            .map(|plan| plan.job_id)
            .collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
    }
}
