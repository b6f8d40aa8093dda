//! Pipeline domain types
//!
//! Pipeline configuration as the config repository hands it out. Pipeline,
//! stage and job names are case-insensitive.

use serde::{Deserialize, Serialize};

use super::material::{DependencyMaterialConfig, MaterialConfig};

/// Pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    /// Materials in declaration order
    pub materials: Vec<MaterialConfig>,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    /// Capability tags an agent must carry to run this job
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactConfig>,
}

/// Kind of artifact a job publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactType {
    File,
    Test,
    External,
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactType::File => write!(f, "file"),
            ArtifactType::Test => write!(f, "unit"),
            ArtifactType::External => write!(f, "external"),
        }
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ArtifactType::File),
            "unit" => Ok(ArtifactType::Test),
            "external" => Ok(ArtifactType::External),
            other => Err(format!("unknown artifact type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub artifact_type: ArtifactType,
    pub src: String,
    #[serde(default)]
    pub dest: String,
}

impl ArtifactConfig {
    pub fn build(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            artifact_type: ArtifactType::File,
            src: src.into(),
            dest: dest.into(),
        }
    }

    pub fn test(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            artifact_type: ArtifactType::Test,
            src: src.into(),
            dest: dest.into(),
        }
    }
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>, materials: Vec<MaterialConfig>) -> Self {
        Self {
            name: name.into(),
            materials,
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Upstream dependencies in declaration order
    pub fn dependency_materials(&self) -> impl Iterator<Item = &DependencyMaterialConfig> {
        self.materials.iter().filter_map(MaterialConfig::as_dependency)
    }

    pub fn find_stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages
            .iter()
            .find(|stage| stage.name.eq_ignore_ascii_case(name))
    }

    pub fn first_stage(&self) -> Option<&StageConfig> {
        self.stages.first()
    }
}

impl StageConfig {
    pub fn new(name: impl Into<String>, jobs: Vec<JobConfig>) -> Self {
        Self {
            name: name.into(),
            jobs,
        }
    }

    pub fn find_job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|job| job.name.eq_ignore_ascii_case(name))
    }
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.extend(resources.into_iter().map(Into::into));
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactConfig) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

// =============================================================================
// Pipeline Identifier
// =============================================================================

/// Identifies one run of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineIdentifier {
    pub name: String,
    pub counter: i64,
    pub label: String,
}

impl PipelineIdentifier {
    pub fn new(name: impl Into<String>, counter: i64, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counter,
            label: label.into(),
        }
    }

    pub fn pipeline_locator(&self) -> String {
        format!("{}/{}", self.name, self.counter)
    }

    pub fn pipeline_locator_for_display(&self) -> String {
        format!("{}/{}", self.name, self.label)
    }

    pub fn as_urn(&self) -> String {
        format!(
            "urn:x-go.studios.thoughtworks.com:job-id:{}:{}",
            self.name, self.counter
        )
    }
}

impl std::fmt::Display for PipelineIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pipeline_locator_for_display())
    }
}
