//! Orchestrator configuration
//!
//! Bind address and job store settings, read from the environment.

use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Postgres connection string. Without one, jobs are kept in memory.
    pub database_url: Option<String>,

    /// Maximum pooled database connections
    pub db_max_connections: u32,

    /// How long to wait for a pooled connection
    pub db_acquire_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(bind_addr: String) -> Self {
        Self {
            bind_addr,
            database_url: None,
            db_max_connections: 10,
            db_acquire_timeout: Duration::from_secs(5),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - ORCHESTRATOR_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - DATABASE_URL (optional, in-memory store when unset)
    /// - DB_MAX_CONNECTIONS (optional, default: 10)
    /// - DB_ACQUIRE_TIMEOUT (optional, seconds, default: 5)
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("ORCHESTRATOR_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let db_max_connections = match std::env::var("DB_MAX_CONNECTIONS") {
            Ok(value) => value.parse::<u32>().map_err(|_| {
                anyhow::anyhow!("DB_MAX_CONNECTIONS must be a number, got '{}'", value)
            })?,
            Err(_) => 10,
        };

        let db_acquire_timeout = std::env::var("DB_ACQUIRE_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        Ok(Self {
            bind_addr,
            database_url,
            db_max_connections,
            db_acquire_timeout,
        })
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if let Some(url) = &self.database_url
            && !url.starts_with("postgres://")
            && !url.starts_with("postgresql://")
        {
            anyhow::bail!("DATABASE_URL must start with postgres:// or postgresql://");
        }

        if self.db_max_connections == 0 {
            anyhow::bail!("db_max_connections must be greater than 0");
        }

        if self.db_acquire_timeout.is_zero() {
            anyhow::bail!("db_acquire_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("0.0.0.0:8080".to_string())
    }
}
