//! Pipeline Config Repository
//!
//! Holds the configured pipelines, keyed by lowercased name. A pipeline is
//! only accepted when its whole upstream graph resolves, so every stored
//! configuration is acyclic and complete.

use std::collections::HashMap;

use gantry_core::domain::graph::{DependencyGraph, GraphError};
use gantry_core::domain::pipeline::PipelineConfig;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct PipelineConfigRepository {
    pipelines: RwLock<HashMap<String, PipelineConfig>>,
}

impl PipelineConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a pipeline, replacing any pipeline with the same name
    ///
    /// Rejected when an upstream pipeline is missing or the dependencies
    /// would form a cycle.
    pub async fn save(&self, pipeline: PipelineConfig) -> Result<(), GraphError> {
        let mut pipelines = self.pipelines.write().await;
        let key = pipeline.name.to_lowercase();

        DependencyGraph::from_configs(&pipeline.name, |name| {
            if pipeline.has_name(name) {
                Some(pipeline.clone())
            } else {
                pipelines.get(&name.to_lowercase()).cloned()
            }
        })?;

        tracing::info!(
            "Saved pipeline {} with {} materials",
            pipeline.name,
            pipeline.materials.len()
        );
        pipelines.insert(key, pipeline);
        Ok(())
    }

    pub async fn find(&self, name: &str) -> Option<PipelineConfig> {
        self.pipelines.read().await.get(&name.to_lowercase()).cloned()
    }

    /// All pipelines sorted by name
    pub async fn list(&self) -> Vec<PipelineConfig> {
        let mut pipelines: Vec<PipelineConfig> =
            self.pipelines.read().await.values().cloned().collect();
        pipelines.sort_by(|a, b| a.name.cmp(&b.name));
        pipelines
    }

    /// Dependency graph rooted at the named pipeline
    pub async fn dependency_graph(&self, name: &str) -> Result<DependencyGraph, GraphError> {
        let pipelines = self.pipelines.read().await;
        DependencyGraph::from_configs(name, |lookup| {
            pipelines.get(&lookup.to_lowercase()).cloned()
        })
    }

    /// Names of pipelines with a git material on the given repository
    pub async fn pipelines_with_git_url(&self, url: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .pipelines
            .read()
            .await
            .values()
            .filter(|pipeline| {
                pipeline
                    .materials
                    .iter()
                    .any(|material| material.matches_repository_url(url))
            })
            .map(|pipeline| pipeline.name.clone())
            .collect();
        names.sort();
        names
    }
}
