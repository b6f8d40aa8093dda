use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

use crate::config::Config;
use crate::repository::{InMemoryJobStore, JobStore, PgJobStore, PipelineConfigRepository};
use crate::service::{AgentRegistry, JobStatusCache, ScheduleService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gantry Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(database_url, &config)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Arc::new(PgJobStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
            Arc::new(InMemoryJobStore::new())
        }
    };

    let pipelines = Arc::new(PipelineConfigRepository::new());
    let state = api::AppState {
        schedule: Arc::new(ScheduleService::new(
            store,
            Arc::clone(&pipelines),
            Arc::new(JobStatusCache::new()),
        )),
        pipelines,
        agents: Arc::new(AgentRegistry::new()),
    };

    // Build router with all API endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
