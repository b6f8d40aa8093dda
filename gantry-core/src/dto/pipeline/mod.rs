//! Pipeline DTOs

use serde::{Deserialize, Serialize};

use crate::domain::graph::QueueEntry;
use crate::domain::material::{MaterialConfig, MaterialType};
use crate::domain::pipeline::PipelineConfig;

/// Summary information about a configured pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub name: String,
    pub material_count: usize,
    /// Upstream pipelines in declaration order
    pub upstream: Vec<String>,
    pub stages: Vec<String>,
}

impl From<&PipelineConfig> for PipelineSummary {
    fn from(pipeline: &PipelineConfig) -> Self {
        PipelineSummary {
            name: pipeline.name.clone(),
            material_count: pipeline.materials.len(),
            upstream: pipeline
                .dependency_materials()
                .map(|dependency| dependency.pipeline_name.clone())
                .collect(),
            stages: pipeline.stages.iter().map(|stage| stage.name.clone()).collect(),
        }
    }
}

/// One entry of a pipeline's build queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntrySummary {
    pub pipeline: String,
    /// Pipeline names from the root to `pipeline`
    pub path: Vec<String>,
}

impl From<&QueueEntry<'_>> for QueueEntrySummary {
    fn from(entry: &QueueEntry<'_>) -> Self {
        QueueEntrySummary {
            pipeline: entry.pipeline.name.clone(),
            path: entry.path_names().into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialSummary {
    pub fingerprint: String,
    pub material_type: MaterialType,
    pub display_name: String,
}

impl From<&MaterialConfig> for MaterialSummary {
    fn from(material: &MaterialConfig) -> Self {
        MaterialSummary {
            fingerprint: material.fingerprint(),
            material_type: material.material_type(),
            display_name: material.display_name(),
        }
    }
}

/// Material analysis of a pipeline against its upstream graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMaterials {
    pub pipeline: String,
    /// Materials no upstream pipeline declares
    pub unshared: Vec<MaterialSummary>,
    /// Every fingerprint in the graph, sorted
    pub fingerprints: Vec<String>,
}

/// Request to schedule a stage of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePipeline {
    pub counter: i64,
    /// Defaults to the counter
    #[serde(default)]
    pub label: Option<String>,
    /// Defaults to the first stage
    #[serde(default)]
    pub stage: Option<String>,
}
