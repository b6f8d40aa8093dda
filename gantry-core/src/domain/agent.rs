//! Agent domain types
//!
//! Runtime snapshot of a build agent as the server sees it. The snapshot is
//! refreshed on every ping by overwriting fields with the newest report.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Agent should not register without installation path")]
    MissingLocation,
}

/// Who an agent is
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentifier {
    pub hostname: String,
    pub ip_address: String,
    pub uuid: String,
}

impl AgentIdentifier {
    pub fn new(
        hostname: impl Into<String>,
        ip_address: impl Into<String>,
        uuid: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            ip_address: ip_address.into(),
            uuid: uuid.into(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.ip_address
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRuntimeStatus {
    Idle,
    Building,
    LostContact,
    Missing,
    Cancelled,
    Unknown,
}

impl std::fmt::Display for AgentRuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRuntimeStatus::Idle => write!(f, "Idle"),
            AgentRuntimeStatus::Building => write!(f, "Building"),
            AgentRuntimeStatus::LostContact => write!(f, "LostContact"),
            AgentRuntimeStatus::Missing => write!(f, "Missing"),
            AgentRuntimeStatus::Cancelled => write!(f, "Cancelled"),
            AgentRuntimeStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// What an agent is currently building, if anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBuildingInfo {
    pub build_info: String,
    pub build_locator: String,
}

impl AgentBuildingInfo {
    pub fn new(build_info: impl Into<String>, build_locator: impl Into<String>) -> Self {
        Self {
            build_info: build_info.into(),
            build_locator: build_locator.into(),
        }
    }

    pub fn not_building() -> Self {
        Self::default()
    }

    pub fn is_building(&self) -> bool {
        !self.build_locator.is_empty()
    }
}

/// Per-agent runtime snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRuntimeInfo {
    pub identifier: AgentIdentifier,
    pub runtime_status: AgentRuntimeStatus,
    #[serde(default)]
    pub building_info: AgentBuildingInfo,
    pub location: String,
    /// Bytes available at `location`, when known
    pub usable_space: Option<u64>,
    pub operating_system: Option<String>,
    /// Random token chosen by the agent process. Two processes claiming the
    /// same uuid carry different cookies.
    pub cookie: Option<String>,
    #[serde(default)]
    pub agent_version: Option<String>,
    #[serde(default)]
    pub bootstrapper_version: Option<String>,
}

impl AgentRuntimeInfo {
    /// Snapshot built by the server for an agent it knows about
    pub fn from_server(
        identifier: AgentIdentifier,
        registered: bool,
        location: &str,
        usable_space: Option<u64>,
        operating_system: Option<&str>,
    ) -> Result<Self, AgentError> {
        if location.trim().is_empty() {
            return Err(AgentError::MissingLocation);
        }

        let runtime_status = if registered || identifier.is_local() {
            AgentRuntimeStatus::Idle
        } else {
            AgentRuntimeStatus::Unknown
        };

        Ok(Self {
            identifier,
            runtime_status,
            building_info: AgentBuildingInfo::not_building(),
            location: location.to_string(),
            usable_space,
            operating_system: operating_system.map(str::to_string),
            cookie: None,
            agent_version: None,
            bootstrapper_version: None,
        })
    }

    /// Snapshot reported by the agent process itself
    ///
    /// Usable space is measured at `location`; an unreadable location leaves
    /// it unknown.
    pub fn from_agent(
        identifier: AgentIdentifier,
        runtime_status: AgentRuntimeStatus,
        location: &str,
        cookie: Option<&str>,
        operating_system: Option<&str>,
    ) -> Self {
        Self {
            identifier,
            runtime_status,
            building_info: AgentBuildingInfo::not_building(),
            location: location.to_string(),
            usable_space: usable_space_at(location),
            operating_system: operating_system.map(str::to_string),
            cookie: cookie.map(str::to_string),
            agent_version: None,
            bootstrapper_version: None,
        }
    }

    /// Placeholder for an agent the server has not heard from yet
    pub fn initial_state(identifier: AgentIdentifier) -> Self {
        Self {
            identifier,
            runtime_status: AgentRuntimeStatus::Missing,
            building_info: AgentBuildingInfo::not_building(),
            location: String::new(),
            usable_space: None,
            operating_system: None,
            cookie: None,
            agent_version: None,
            bootstrapper_version: None,
        }
    }

    pub fn update_agent_version(mut self, version: impl Into<String>) -> Self {
        self.agent_version = Some(version.into());
        self
    }

    pub fn update_bootstrapper_version(mut self, version: impl Into<String>) -> Self {
        self.bootstrapper_version = Some(version.into());
        self
    }

    pub fn uuid(&self) -> &str {
        &self.identifier.uuid
    }

    pub fn is_low_disk_space(&self, limit_bytes: u64) -> bool {
        self.usable_space.is_some_and(|space| space < limit_bytes)
    }

    /// Whether `cookie` belongs to a different process than this snapshot
    pub fn has_duplicate_cookie(&self, cookie: Option<&str>) -> bool {
        match (self.cookie.as_deref(), cookie) {
            (Some(ours), Some(theirs)) => ours != theirs,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.runtime_status == AgentRuntimeStatus::Cancelled
    }

    pub fn idle(&mut self) {
        self.runtime_status = AgentRuntimeStatus::Idle;
        self.building_info = AgentBuildingInfo::not_building();
    }

    pub fn busy(&mut self, building_info: AgentBuildingInfo) {
        self.runtime_status = AgentRuntimeStatus::Building;
        self.building_info = building_info;
    }

    pub fn lost_contact(&mut self) {
        self.runtime_status = AgentRuntimeStatus::LostContact;
    }

    /// Merges a fresh report into this snapshot
    ///
    /// Reported fields overwrite the stored ones. A Cancelled status is
    /// sticky from the agent's side and always carried over.
    pub fn update_self(&mut self, newer: &AgentRuntimeInfo) {
        self.building_info = newer.building_info.clone();
        self.location = newer.location.clone();
        self.usable_space = newer.usable_space;
        self.operating_system = newer.operating_system.clone();
        self.agent_version = newer.agent_version.clone();
        self.bootstrapper_version = newer.bootstrapper_version.clone();
        if newer.is_cancelled() {
            self.runtime_status = AgentRuntimeStatus::Cancelled;
        }
    }

    pub fn agent_info_debug_string(&self) -> String {
        format!(
            "Agent [{}, {}, {}, {}]",
            self.identifier.hostname,
            self.identifier.ip_address,
            self.identifier.uuid,
            self.cookie.as_deref().unwrap_or("")
        )
    }

    pub fn agent_info_for_display(&self) -> String {
        format!(
            "Agent located at [{}, {}, {}]",
            self.identifier.hostname, self.identifier.ip_address, self.location
        )
    }
}

fn usable_space_at(location: &str) -> Option<u64> {
    match fs2::available_space(Path::new(location)) {
        Ok(space) => Some(space),
        Err(err) => {
            tracing::debug!("Could not read usable space at {}: {}", location, err);
            None
        }
    }
}
