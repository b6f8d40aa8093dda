//! Job Repository
//!
//! Postgres access for job instances, their state transitions and plans.
//! Functions take a connection so they can run inside a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::domain::job::{
    ArtifactPlan, JobIdentifier, JobInstance, JobPlan, JobResult, JobState, JobStateTransition,
    Resource,
};
use gantry_core::domain::pipeline::ArtifactType;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::store::{JobStore, JobTransaction, Result as StoreResult};

const ACTIVE_STATES: [JobState; 5] = [
    JobState::Scheduled,
    JobState::Assigned,
    JobState::Preparing,
    JobState::Building,
    JobState::Completing,
];

// =============================================================================
// Job Instances
// =============================================================================

/// Insert a job instance with its transitions
pub async fn insert(conn: &mut PgConnection, job: &JobInstance) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO job_instances (
            id, pipeline_name, pipeline_counter, pipeline_label, stage_name,
            stage_counter, job_name, state, result, agent_uuid, ignored,
            schedule_order, scheduled_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(job.id)
    .bind(&job.identifier.pipeline_name)
    .bind(job.identifier.pipeline_counter)
    .bind(&job.identifier.pipeline_label)
    .bind(&job.identifier.stage_name)
    .bind(job.identifier.stage_counter)
    .bind(&job.identifier.job_name)
    .bind(job.state.to_string())
    .bind(job.result.to_string())
    .bind(&job.agent_uuid)
    .bind(job.ignored)
    .bind(job.schedule_order)
    .bind(job.scheduled_at)
    .execute(&mut *conn)
    .await?;

    insert_transitions(conn, job.id, &job.transitions).await
}

/// Find a job instance by ID, with its transition history
pub async fn find_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<JobInstance>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobInstanceRow>(
        r#"
        SELECT id, pipeline_name, pipeline_counter, pipeline_label, stage_name,
               stage_counter, job_name, state, result, agent_uuid, ignored,
               schedule_order, scheduled_at
        FROM job_instances
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let mut job: JobInstance = row.into();
            job.transitions = find_transitions(conn, job.id).await?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Find running, non-ignored jobs assigned to an agent
pub async fn find_active_by_agent(
    conn: &mut PgConnection,
    agent_uuid: &str,
) -> Result<Vec<JobInstance>, sqlx::Error> {
    let states: Vec<String> = ACTIVE_STATES.iter().map(ToString::to_string).collect();

    let rows = sqlx::query_as::<_, JobInstanceRow>(
        r#"
        SELECT id, pipeline_name, pipeline_counter, pipeline_label, stage_name,
               stage_counter, job_name, state, result, agent_uuid, ignored,
               schedule_order, scheduled_at
        FROM job_instances
        WHERE agent_uuid = $1 AND ignored = FALSE AND state = ANY($2)
        ORDER BY schedule_order ASC
        "#,
    )
    .bind(agent_uuid)
    .bind(states)
    .fetch_all(&mut *conn)
    .await?;

    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        let mut job: JobInstance = row.into();
        job.transitions = find_transitions(conn, job.id).await?;
        jobs.push(job);
    }

    Ok(jobs)
}

/// Highest stage counter of a stage within a pipeline run
pub async fn max_stage_counter(
    conn: &mut PgConnection,
    pipeline_name: &str,
    pipeline_counter: i64,
    stage_name: &str,
) -> Result<Option<i64>, sqlx::Error> {
    let counter: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(stage_counter)
        FROM job_instances
        WHERE LOWER(pipeline_name) = LOWER($1)
          AND pipeline_counter = $2
          AND LOWER(stage_name) = LOWER($3)
        "#,
    )
    .bind(pipeline_name)
    .bind(pipeline_counter)
    .bind(stage_name)
    .fetch_one(&mut *conn)
    .await?;

    Ok(counter)
}

/// Update the mutable columns of a job and append new transitions
pub async fn update(conn: &mut PgConnection, job: &JobInstance) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE job_instances
        SET state = $1, result = $2, agent_uuid = $3, ignored = $4
        WHERE id = $5
        "#,
    )
    .bind(job.state.to_string())
    .bind(job.result.to_string())
    .bind(&job.agent_uuid)
    .bind(job.ignored)
    .bind(job.id)
    .execute(&mut *conn)
    .await?;

    let stored: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM job_state_transitions WHERE job_id = $1")
            .bind(job.id)
            .fetch_one(&mut *conn)
            .await?;

    let new_transitions = job
        .transitions
        .get(stored as usize..)
        .unwrap_or_default();
    insert_transitions(conn, job.id, new_transitions).await
}

/// Plans of non-ignored Scheduled jobs in scheduling order
pub async fn find_scheduled_plans(
    conn: &mut PgConnection,
) -> Result<Vec<JobPlan>, sqlx::Error> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM job_instances
        WHERE state = $1 AND ignored = FALSE
        ORDER BY schedule_order ASC
        "#,
    )
    .bind(JobState::Scheduled.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut plans = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(plan) = load_plan(conn, id).await? {
            plans.push(plan);
        }
    }

    Ok(plans)
}

// =============================================================================
// Job Plans
// =============================================================================

/// Insert the resources and artifact plans of a job
pub async fn insert_plan(conn: &mut PgConnection, plan: &JobPlan) -> Result<(), sqlx::Error> {
    for (position, resource) in plan.resources.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO job_resources (id, job_id, name, position)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(resource.id)
        .bind(plan.job_id)
        .bind(&resource.name)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }

    for (position, artifact) in plan.artifact_plans.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO job_artifact_plans (id, job_id, artifact_type, src, dest, position)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(artifact.id)
        .bind(plan.job_id)
        .bind(artifact.artifact_type.to_string())
        .bind(&artifact.src)
        .bind(&artifact.dest)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Load the plan of a job; `None` when the job does not exist
pub async fn load_plan(
    conn: &mut PgConnection,
    job_id: Uuid,
) -> Result<Option<JobPlan>, sqlx::Error> {
    let Some(row) = sqlx::query_as::<_, JobInstanceRow>(
        r#"
        SELECT id, pipeline_name, pipeline_counter, pipeline_label, stage_name,
               stage_counter, job_name, state, result, agent_uuid, ignored,
               schedule_order, scheduled_at
        FROM job_instances
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let resources = sqlx::query_as::<_, ResourceRow>(
        r#"
        SELECT id, job_id, name
        FROM job_resources
        WHERE job_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(&mut *conn)
    .await?;

    let artifacts = sqlx::query_as::<_, ArtifactPlanRow>(
        r#"
        SELECT id, job_id, artifact_type, src, dest
        FROM job_artifact_plans
        WHERE job_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(JobPlan {
        job_id,
        identifier: row.identifier(),
        resources: resources.into_iter().map(Into::into).collect(),
        artifact_plans: artifacts.into_iter().map(Into::into).collect(),
    }))
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn insert_transitions(
    conn: &mut PgConnection,
    job_id: Uuid,
    transitions: &[JobStateTransition],
) -> Result<(), sqlx::Error> {
    for transition in transitions {
        sqlx::query(
            r#"
            INSERT INTO job_state_transitions (job_id, state, changed_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(job_id)
        .bind(transition.state.to_string())
        .bind(transition.changed_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn find_transitions(
    conn: &mut PgConnection,
    job_id: Uuid,
) -> Result<Vec<JobStateTransition>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransitionRow>(
        r#"
        SELECT state, changed_at
        FROM job_state_transitions
        WHERE job_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

fn parse_state(s: &str) -> JobState {
    s.parse().unwrap_or_else(|err| {
        tracing::warn!("{}", err);
        JobState::Unknown
    })
}

fn parse_result(s: &str) -> JobResult {
    s.parse().unwrap_or_else(|err| {
        tracing::warn!("{}", err);
        JobResult::Unknown
    })
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobInstanceRow {
    id: Uuid,
    pipeline_name: String,
    pipeline_counter: i64,
    pipeline_label: String,
    stage_name: String,
    stage_counter: i64,
    job_name: String,
    state: String,
    result: String,
    agent_uuid: Option<String>,
    ignored: bool,
    schedule_order: i64,
    scheduled_at: DateTime<Utc>,
}

impl JobInstanceRow {
    fn identifier(&self) -> JobIdentifier {
        JobIdentifier {
            pipeline_name: self.pipeline_name.clone(),
            pipeline_counter: self.pipeline_counter,
            pipeline_label: self.pipeline_label.clone(),
            stage_name: self.stage_name.clone(),
            stage_counter: self.stage_counter,
            job_name: self.job_name.clone(),
        }
    }
}

impl From<JobInstanceRow> for JobInstance {
    fn from(row: JobInstanceRow) -> Self {
        JobInstance {
            id: row.id,
            identifier: row.identifier(),
            state: parse_state(&row.state),
            result: parse_result(&row.result),
            agent_uuid: row.agent_uuid,
            ignored: row.ignored,
            schedule_order: row.schedule_order,
            scheduled_at: row.scheduled_at,
            transitions: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransitionRow {
    state: String,
    changed_at: DateTime<Utc>,
}

impl From<TransitionRow> for JobStateTransition {
    fn from(row: TransitionRow) -> Self {
        JobStateTransition {
            state: parse_state(&row.state),
            changed_at: row.changed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    job_id: Uuid,
    name: String,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        Resource {
            id: row.id,
            job_id: row.job_id,
            name: row.name,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArtifactPlanRow {
    id: Uuid,
    job_id: Uuid,
    artifact_type: String,
    src: String,
    dest: String,
}

impl From<ArtifactPlanRow> for ArtifactPlan {
    fn from(row: ArtifactPlanRow) -> Self {
        let artifact_type = row.artifact_type.parse().unwrap_or_else(|err| {
            tracing::warn!("{}", err);
            ArtifactType::File
        });

        ArtifactPlan {
            id: row.id,
            job_id: row.job_id,
            artifact_type,
            src: row.src,
            dest: row.dest,
        }
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

/// Job store backed by Postgres
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn begin(&self) -> StoreResult<Box<dyn JobTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgJobTransaction { tx }))
    }

    async fn find_job(&self, id: Uuid) -> StoreResult<Option<JobInstance>> {
        let mut conn = self.pool.acquire().await?;
        Ok(find_by_id(&mut conn, id).await?)
    }

    async fn ordered_scheduled_builds(&self) -> StoreResult<Vec<JobPlan>> {
        let mut conn = self.pool.acquire().await?;
        Ok(find_scheduled_plans(&mut conn).await?)
    }
}

pub struct PgJobTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl JobTransaction for PgJobTransaction {
    async fn find_job(&mut self, id: Uuid) -> StoreResult<Option<JobInstance>> {
        Ok(find_by_id(&mut self.tx, id).await?)
    }

    async fn load_plan(&mut self, job_id: Uuid) -> StoreResult<Option<JobPlan>> {
        Ok(load_plan(&mut self.tx, job_id).await?)
    }

    async fn active_jobs_for_agent(&mut self, agent_uuid: &str) -> StoreResult<Vec<JobInstance>> {
        Ok(find_active_by_agent(&mut self.tx, agent_uuid).await?)
    }

    async fn max_stage_counter(
        &mut self,
        pipeline_name: &str,
        pipeline_counter: i64,
        stage_name: &str,
    ) -> StoreResult<Option<i64>> {
        Ok(max_stage_counter(&mut self.tx, pipeline_name, pipeline_counter, stage_name).await?)
    }

    async fn insert_job(&mut self, job: &JobInstance) -> StoreResult<()> {
        Ok(insert(&mut self.tx, job).await?)
    }

    async fn update_job(&mut self, job: &JobInstance) -> StoreResult<()> {
        Ok(update(&mut self.tx, job).await?)
    }

    async fn insert_plan(&mut self, plan: &JobPlan) -> StoreResult<()> {
        Ok(insert_plan(&mut self.tx, plan).await?)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
