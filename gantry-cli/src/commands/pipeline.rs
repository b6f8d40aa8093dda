//! Pipeline command handlers
//!
//! Handles pipeline creation, listing, dependency analysis and scheduling.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use gantry_core::domain::pipeline::PipelineConfig;
use gantry_core::dto::pipeline::{PipelineSummary, SchedulePipeline};

use crate::commands::job::print_job_summary;
use crate::config::Config;
use gantry_client::OrchestratorClient;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Create or replace a pipeline from a JSON definition
    Create {
        /// Path to the pipeline JSON file
        #[arg(short, long)]
        file: String,

        /// Override the pipeline name from the file
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List all pipelines
    List,
    /// Show a pipeline's configuration
    Get {
        /// Pipeline name
        name: String,
    },
    /// Show the upstream build queue of a pipeline
    Queue {
        /// Pipeline name
        name: String,
    },
    /// Show unshared materials and graph fingerprints
    Materials {
        /// Pipeline name
        name: String,
    },
    /// Schedule a stage of a pipeline run
    Schedule {
        /// Pipeline name
        name: String,

        /// Pipeline run counter
        #[arg(short, long)]
        counter: i64,

        /// Run label (defaults to the counter)
        #[arg(short, long)]
        label: Option<String>,

        /// Stage to schedule (defaults to the first stage)
        #[arg(short, long)]
        stage: Option<String>,
    },
}

/// Handle pipeline commands
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        PipelineCommands::Create { file, name } => create_pipeline(&client, &file, name).await,
        PipelineCommands::List => list_pipelines(&client).await,
        PipelineCommands::Get { name } => get_pipeline(&client, &name).await,
        PipelineCommands::Queue { name } => show_queue(&client, &name).await,
        PipelineCommands::Materials { name } => show_materials(&client, &name).await,
        PipelineCommands::Schedule {
            name,
            counter,
            label,
            stage,
        } => {
            let req = SchedulePipeline {
                counter,
                label,
                stage,
            };
            schedule_pipeline(&client, &name, &req).await
        }
    }
}

/// Read a pipeline definition from a JSON file
fn load_pipeline_config(path: &Path, name_override: Option<String>) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

    let mut pipeline: PipelineConfig = serde_json::from_str(&content)
        .with_context(|| format!("Invalid pipeline definition in {}", path.display()))?;

    if let Some(name) = name_override {
        pipeline.name = name;
    }

    Ok(pipeline)
}

async fn create_pipeline(
    client: &OrchestratorClient,
    file: &str,
    name_override: Option<String>,
) -> Result<()> {
    let pipeline = load_pipeline_config(Path::new(file), name_override)?;

    let summary = client
        .create_pipeline(&pipeline)
        .await
        .with_context(|| format!("Failed to create pipeline {}", pipeline.name))?;

    println!("{} Pipeline saved", "✓".green());
    print_pipeline_summary(&summary);

    Ok(())
}

async fn list_pipelines(client: &OrchestratorClient) -> Result<()> {
    let pipelines = client.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!("{}", format!("Found {} pipeline(s):", pipelines.len()).bold());
        println!();
        for pipeline in pipelines {
            print_pipeline_summary(&pipeline);
        }
    }

    Ok(())
}

async fn get_pipeline(client: &OrchestratorClient, name: &str) -> Result<()> {
    let pipeline = client.get_pipeline(name).await?;

    println!("{}", "Pipeline Details:".bold());
    println!("  Name: {}", pipeline.name.cyan());

    println!("\n{}", "Materials:".bold());
    for material in &pipeline.materials {
        println!(
            "  {} {} {}",
            "▸".cyan(),
            material.display_name(),
            material.fingerprint()[..12].dimmed()
        );
    }

    if !pipeline.stages.is_empty() {
        println!("\n{}", "Stages:".bold());
        for stage in &pipeline.stages {
            println!("  {} {}", "▸".cyan(), stage.name.bold());
            for job in &stage.jobs {
                if job.resources.is_empty() {
                    println!("      {}", job.name);
                } else {
                    println!("      {} [{}]", job.name, job.resources.join(", ").dimmed());
                }
            }
        }
    }

    Ok(())
}

async fn show_queue(client: &OrchestratorClient, name: &str) -> Result<()> {
    let queue = client.build_queue(name).await?;

    if queue.is_empty() {
        println!("{}", format!("Pipeline {} has no upstream pipelines.", name).yellow());
        return Ok(());
    }

    println!("{}", format!("Build queue of {}:", name).bold());
    for entry in queue {
        println!(
            "  {} {:<20} {}",
            "▸".cyan(),
            entry.pipeline,
            entry.path.join(" <- ").dimmed()
        );
    }

    Ok(())
}

async fn show_materials(client: &OrchestratorClient, name: &str) -> Result<()> {
    let materials = client.pipeline_materials(name).await?;

    println!(
        "{}",
        format!("Unshared materials of {}:", materials.pipeline).bold()
    );
    if materials.unshared.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for material in &materials.unshared {
        println!(
            "  {} {} ({:?})",
            "▸".cyan(),
            material.display_name,
            material.material_type
        );
    }

    println!(
        "\n{}",
        format!("{} fingerprint(s) in graph:", materials.fingerprints.len()).bold()
    );
    for fingerprint in &materials.fingerprints {
        println!("  {}", fingerprint.dimmed());
    }

    Ok(())
}

async fn schedule_pipeline(
    client: &OrchestratorClient,
    name: &str,
    req: &SchedulePipeline,
) -> Result<()> {
    let jobs = client.schedule_pipeline(name, req).await?;

    println!(
        "{} Scheduled {} job(s) for {} run {}",
        "✓".green(),
        jobs.len(),
        name.bold(),
        req.counter
    );
    println!();
    for job in &jobs {
        print_job_summary(job);
    }

    Ok(())
}

fn print_pipeline_summary(pipeline: &PipelineSummary) {
    println!("  {} Pipeline {}", "▸".cyan(), pipeline.name.bold());
    println!("    Materials: {}", pipeline.material_count);
    if !pipeline.upstream.is_empty() {
        println!("    Upstream:  {}", pipeline.upstream.join(", ").dimmed());
    }
    if !pipeline.stages.is_empty() {
        println!("    Stages:    {}", pipeline.stages.join(" -> "));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_pipeline_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "name": "studios",
                "materials": [
                    {{ "type": "git", "url": "http://host/repo.git" }},
                    {{ "type": "dependency", "pipeline_name": "up", "stage_name": "first" }}
                ],
                "stages": [{{ "name": "mingle", "jobs": [{{ "name": "unit" }}] }}]
            }}"#
        )
        .unwrap();

        let pipeline = load_pipeline_config(file.path(), None).unwrap();

        assert_eq!(pipeline.name, "studios");
        assert_eq!(pipeline.materials.len(), 2);
        assert_eq!(pipeline.dependency_materials().count(), 1);
        assert_eq!(pipeline.stages[0].jobs[0].name, "unit");
    }

    #[test]
    fn test_load_pipeline_config_with_name_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "name": "studios", "materials": [] }}"#).unwrap();

        let pipeline = load_pipeline_config(file.path(), Some("renamed".to_string())).unwrap();

        assert_eq!(pipeline.name, "renamed");
        assert!(pipeline.stages.is_empty());
    }

    #[test]
    fn test_load_pipeline_config_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = load_pipeline_config(file.path(), None).unwrap_err();

        assert!(err.to_string().contains("Invalid pipeline definition"));
    }
}
