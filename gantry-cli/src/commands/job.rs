//! Job command handlers
//!
//! Handles job inspection, rescheduling and cancellation.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use gantry_core::domain::job::{JobResult, JobState};
use gantry_core::dto::job::{JobSummary, ScheduledBuild};
use uuid::Uuid;

use crate::config::Config;
use gantry_client::OrchestratorClient;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// List jobs waiting for an agent
    Scheduled,
    /// Get job details
    Get {
        /// Job ID
        id: String,
    },
    /// Replace a hung job with a fresh scheduled instance
    Reschedule {
        /// Job ID
        id: String,
    },
    /// Cancel a job that has not completed
    Cancel {
        /// Job ID
        id: String,
    },
    /// Show the latest instance of a configured job
    Status {
        /// Pipeline name
        pipeline: String,
        /// Stage name
        stage: String,
        /// Job name
        job: String,
    },
}

/// Handle job commands
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        JobCommands::Scheduled => list_scheduled_builds(&client).await,
        JobCommands::Get { id } => get_job(&client, &id).await,
        JobCommands::Reschedule { id } => reschedule_job(&client, &id).await,
        JobCommands::Cancel { id } => cancel_job(&client, &id).await,
        JobCommands::Status {
            pipeline,
            stage,
            job,
        } => job_status(&client, &pipeline, &stage, &job).await,
    }
}

fn parse_job_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).with_context(|| format!("'{}' is not a valid job ID", id))
}

async fn list_scheduled_builds(client: &OrchestratorClient) -> Result<()> {
    let builds = client.list_scheduled_builds().await?;

    if builds.is_empty() {
        println!("{}", "No scheduled jobs found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} scheduled job(s):", builds.len()).bold()
        );
        println!();
        for build in builds {
            print_scheduled_build(&build);
        }
    }

    Ok(())
}

async fn get_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let job = client.get_job(parse_job_id(id)?).await?;

    print_job_details(&job);

    Ok(())
}

async fn reschedule_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let response = client.reschedule_job(parse_job_id(id)?).await?;

    match response.new_job {
        Some(new_job) if response.rescheduled => {
            println!(
                "{} Job {} rescheduled as {}",
                "✓".green(),
                response.job_id.to_string().dimmed(),
                new_job.id.to_string().cyan()
            );
            println!();
            print_job_summary(&new_job);
        }
        _ => {
            println!(
                "{} Job {} not rescheduled: {}",
                "⚠".yellow(),
                response.job_id,
                response.reason.unwrap_or_default()
            );
        }
    }

    Ok(())
}

async fn cancel_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let job = client.cancel_job(parse_job_id(id)?).await?;

    if job.result == JobResult::Cancelled {
        println!("{} Job {} cancelled", "✓".green(), job.locator.bold());
    } else {
        println!(
            "{} Job {} already finished as {}",
            "⚠".yellow(),
            job.locator.bold(),
            colorize_result(job.result)
        );
    }

    Ok(())
}

async fn job_status(
    client: &OrchestratorClient,
    pipeline: &str,
    stage: &str,
    job: &str,
) -> Result<()> {
    match client.current_job(pipeline, stage, job).await {
        Ok(current) => {
            print_job_details(&current);
            Ok(())
        }
        Err(err) if err.is_not_found() => {
            println!(
                "{}",
                format!("No instance of {}/{}/{} has been scheduled.", pipeline, stage, job)
                    .yellow()
            );
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Print a one-block job summary
pub fn print_job_summary(job: &JobSummary) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Locator: {}", job.locator.bold());
    println!("    State:   {}", colorize_state(job.state));
    if let Some(agent) = &job.agent_uuid {
        println!("    Agent:   {}", agent.dimmed());
    }
    println!();
}

fn print_scheduled_build(build: &ScheduledBuild) {
    println!("  {} {}", "▸".cyan(), build.locator.bold());
    println!("    Job:       {}", build.job_id.to_string().dimmed());
    if !build.resources.is_empty() {
        println!("    Resources: {}", build.resources.join(", "));
    }
    for artifact in &build.artifacts {
        println!(
            "    Artifact:  {} {} -> {}",
            artifact.artifact_type.to_string().dimmed(),
            artifact.src,
            artifact.dest
        );
    }
    println!();
}

fn print_job_details(job: &JobSummary) {
    println!("{}", "Job Details:".bold());
    println!("  ID:        {}", job.id.to_string().cyan());
    println!("  Locator:   {}", job.locator);
    println!("  Pipeline:  {}", job.pipeline_name);
    println!("  Stage:     {}", job.stage_name);
    println!("  Job:       {}", job.job_name);
    println!("  State:     {}", colorize_state(job.state));
    println!("  Result:    {}", colorize_result(job.result));
    println!(
        "  Scheduled: {}",
        job.scheduled_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(agent) = &job.agent_uuid {
        println!("  Agent:     {}", agent);
    }

    if job.ignored {
        println!("  {}", "Replaced by a rescheduled instance".dimmed());
    }
}

/// Colorize job state for display
fn colorize_state(state: JobState) -> colored::ColoredString {
    let state_str = state.to_string();
    match state {
        JobState::Scheduled => state_str.yellow(),
        JobState::Assigned | JobState::Preparing => state_str.blue(),
        JobState::Building | JobState::Completing => state_str.cyan(),
        JobState::Completed => state_str.green(),
        JobState::Rescheduled | JobState::Unknown => state_str.dimmed(),
    }
}

/// Colorize job result for display
fn colorize_result(result: JobResult) -> colored::ColoredString {
    let result_str = result.to_string();
    match result {
        JobResult::Passed => result_str.green(),
        JobResult::Failed => result_str.red(),
        JobResult::Cancelled => result_str.dimmed(),
        JobResult::Unknown => result_str.normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id() {
        let id = Uuid::new_v4();

        assert_eq!(parse_job_id(&id.to_string()).unwrap(), id);
        assert_eq!(parse_job_id(&format!(" {} ", id)).unwrap(), id);
        assert!(parse_job_id("3fa2").is_err());
    }
}
