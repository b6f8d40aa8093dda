//! Material DTOs

use serde::{Deserialize, Serialize};

/// Post-commit notification for a git repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitNotification {
    pub repository_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    /// Pipelines with a git material on the notified repository
    pub pipelines: Vec<String>,
}
