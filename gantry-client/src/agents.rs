//! Agent-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use gantry_core::domain::agent::AgentRuntimeInfo;
use gantry_core::dto::agent::{AgentSummary, PingResponse};

impl OrchestratorClient {
    /// Report an agent's runtime snapshot
    ///
    /// An idle report takes back any job the agent still holds.
    pub async fn ping(&self, info: &AgentRuntimeInfo) -> Result<PingResponse> {
        let url = self.api_url("agent/ping");
        let response = self.client.post(&url).json(info).send().await?;

        self.handle_response(response).await
    }

    /// List all known agents
    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>> {
        let url = self.api_url("agent/list");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
