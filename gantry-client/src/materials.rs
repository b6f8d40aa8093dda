//! Material notification endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use gantry_core::dto::material::{GitNotification, NotificationResponse};

impl OrchestratorClient {
    /// Notify the orchestrator of a push to a git repository
    pub async fn notify_git(&self, repository_url: &str) -> Result<NotificationResponse> {
        let url = self.api_url("material/notify/git");
        let response = self
            .client
            .post(&url)
            .json(&GitNotification {
                repository_url: repository_url.to_string(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }
}
