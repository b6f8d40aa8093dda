use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::config::Config;

pub async fn create_pool(database_url: &str, config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create job instances table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_instances (
            id UUID PRIMARY KEY,
            pipeline_name VARCHAR(255) NOT NULL,
            pipeline_counter BIGINT NOT NULL,
            pipeline_label VARCHAR(255) NOT NULL,
            stage_name VARCHAR(255) NOT NULL,
            stage_counter BIGINT NOT NULL,
            job_name VARCHAR(255) NOT NULL,
            state VARCHAR(50) NOT NULL,
            result VARCHAR(50) NOT NULL,
            agent_uuid VARCHAR(255),
            ignored BOOLEAN NOT NULL DEFAULT FALSE,
            schedule_order BIGINT NOT NULL,
            scheduled_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create state transitions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_state_transitions (
            id SERIAL PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES job_instances(id) ON DELETE CASCADE,
            state VARCHAR(50) NOT NULL,
            changed_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create job plan tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_resources (
            id UUID PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES job_instances(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name VARCHAR(255) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_artifact_plans (
            id UUID PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES job_instances(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            artifact_type VARCHAR(50) NOT NULL,
            src TEXT NOT NULL,
            dest TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for scheduling queries
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_instances_scheduled ON job_instances(state, ignored, schedule_order)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_instances_agent ON job_instances(agent_uuid)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_instances_stage ON job_instances(pipeline_name, pipeline_counter, stage_name)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_state_transitions_job_id ON job_state_transitions(job_id, id)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_resources_job_id ON job_resources(job_id, position)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_artifact_plans_job_id ON job_artifact_plans(job_id, position)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
