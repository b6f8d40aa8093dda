//! Agent DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::{AgentRuntimeInfo, AgentRuntimeStatus};

/// Summary information about a known agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub uuid: String,
    pub hostname: String,
    pub ip_address: String,
    pub status: AgentRuntimeStatus,
    pub location: String,
    pub usable_space: Option<u64>,
    pub operating_system: Option<String>,
    pub agent_version: Option<String>,
}

impl From<&AgentRuntimeInfo> for AgentSummary {
    fn from(info: &AgentRuntimeInfo) -> Self {
        AgentSummary {
            uuid: info.identifier.uuid.clone(),
            hostname: info.identifier.hostname.clone(),
            ip_address: info.identifier.ip_address.clone(),
            status: info.runtime_status,
            location: info.location.clone(),
            usable_space: info.usable_space,
            operating_system: info.operating_system.clone(),
            agent_version: info.agent_version.clone(),
        }
    }
}

/// Server reply to an agent ping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: AgentRuntimeStatus,
    /// Jobs taken away from the agent because it reported idle
    pub rescheduled_jobs: Vec<Uuid>,
}
