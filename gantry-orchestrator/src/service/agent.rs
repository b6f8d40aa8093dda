//! Agent Registry
//!
//! Runtime snapshots of the agents that ping the orchestrator.

use std::collections::HashMap;

use gantry_core::domain::agent::{AgentError, AgentRuntimeInfo};
use tokio::sync::RwLock;

/// Service error type
#[derive(Debug)]
pub enum AgentRegistryError {
    /// Another process already pings with this uuid
    DuplicateCookie(String),
    Agent(AgentError),
}

impl From<AgentError> for AgentRegistryError {
    fn from(err: AgentError) -> Self {
        AgentRegistryError::Agent(err)
    }
}

pub type Result<T> = std::result::Result<T, AgentRegistryError>;

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentRuntimeInfo>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a ping and return the merged snapshot
    ///
    /// The first ping of an agent fixes its cookie. A cancelled agent stays
    /// cancelled whatever status it reports later.
    pub async fn ping(&self, info: AgentRuntimeInfo) -> Result<AgentRuntimeInfo> {
        if info.location.trim().is_empty() {
            return Err(AgentError::MissingLocation.into());
        }

        let mut agents = self.agents.write().await;
        let Some(known) = agents.get_mut(info.uuid()) else {
            tracing::info!("New agent: {}", info.agent_info_debug_string());
            agents.insert(info.uuid().to_string(), info.clone());
            return Ok(info);
        };

        if known.has_duplicate_cookie(info.cookie.as_deref()) {
            tracing::warn!(
                "Rejecting ping from {}: cookie does not match {}",
                info.agent_info_debug_string(),
                known.agent_info_debug_string()
            );
            return Err(AgentRegistryError::DuplicateCookie(info.uuid().to_string()));
        }

        known.update_self(&info);
        if known.cookie.is_none() {
            known.cookie = info.cookie.clone();
        }
        if !known.is_cancelled() {
            known.runtime_status = info.runtime_status;
        }

        tracing::debug!("Ping from {} ({})", known.uuid(), known.runtime_status);
        Ok(known.clone())
    }

    pub async fn find(&self, uuid: &str) -> Option<AgentRuntimeInfo> {
        self.agents.read().await.get(uuid).cloned()
    }

    /// All known agents sorted by hostname
    pub async fn list(&self) -> Vec<AgentRuntimeInfo> {
        let mut agents: Vec<AgentRuntimeInfo> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| {
            a.identifier
                .hostname
                .cmp(&b.identifier.hostname)
                .then_with(|| a.uuid().cmp(b.uuid()))
        });
        agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::domain::agent::{AgentIdentifier, AgentRuntimeStatus};

    fn report(status: AgentRuntimeStatus, cookie: Option<&str>) -> AgentRuntimeInfo {
        AgentRuntimeInfo {
            identifier: AgentIdentifier::new("build-01", "10.0.0.5", "agent-1"),
            runtime_status: status,
            building_info: Default::default(),
            location: "/var/lib/agent".to_string(),
            usable_space: Some(1024),
            operating_system: Some("Linux".to_string()),
            cookie: cookie.map(str::to_string),
            agent_version: None,
            bootstrapper_version: None,
        }
    }

    #[tokio::test]
    async fn test_ping_registers_and_updates() {
        let registry = AgentRegistry::new();
        registry
            .ping(report(AgentRuntimeStatus::Idle, Some("c1")))
            .await
            .unwrap();

        let mut newer = report(AgentRuntimeStatus::Building, Some("c1"));
        newer.usable_space = Some(2048);
        let merged = registry.ping(newer).await.unwrap();

        assert_eq!(merged.runtime_status, AgentRuntimeStatus::Building);
        assert_eq!(merged.usable_space, Some(2048));
        assert_eq!(registry.list().await.len(), 1);
        assert_eq!(registry.find("agent-1").await, Some(merged));
    }

    #[tokio::test]
    async fn test_ping_rejects_other_cookie() {
        let registry = AgentRegistry::new();
        registry
            .ping(report(AgentRuntimeStatus::Idle, Some("c1")))
            .await
            .unwrap();

        let result = registry
            .ping(report(AgentRuntimeStatus::Idle, Some("c2")))
            .await;

        assert!(matches!(result, Err(AgentRegistryError::DuplicateCookie(uuid)) if uuid == "agent-1"));
    }

    #[tokio::test]
    async fn test_ping_requires_location() {
        let registry = AgentRegistry::new();
        let mut info = report(AgentRuntimeStatus::Idle, None);
        info.location = "  ".to_string();

        let result = registry.ping(info).await;

        assert!(matches!(
            result,
            Err(AgentRegistryError::Agent(AgentError::MissingLocation))
        ));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_status_is_sticky() {
        let registry = AgentRegistry::new();
        registry
            .ping(report(AgentRuntimeStatus::Cancelled, Some("c1")))
            .await
            .unwrap();

        let merged = registry
            .ping(report(AgentRuntimeStatus::Idle, Some("c1")))
            .await
            .unwrap();

        assert!(merged.is_cancelled());
    }
}
