//! Job Status Cache
//!
//! Latest instance of each configured job, keyed by (pipeline, stage, job).
//! Shared by every request handler. Callers update it only after the
//! transaction that produced the instance has committed.

use std::collections::HashMap;

use gantry_core::domain::job::{JobConfigIdentifier, JobInstance};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct JobStatusCache {
    jobs: RwLock<HashMap<JobConfigIdentifier, JobInstance>>,
}

impl JobStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a committed job instance
    ///
    /// Ignored instances never replace the current one.
    pub async fn update(&self, job: &JobInstance) {
        if job.is_ignored() {
            return;
        }

        let key = job.identifier.job_config_identifier();
        tracing::debug!("Caching job {} as current for {}", job.id, job.identifier);
        self.jobs.write().await.insert(key, job.clone());
    }

    pub async fn current(&self, key: &JobConfigIdentifier) -> Option<JobInstance> {
        self.jobs.read().await.get(key).cloned()
    }
}
