//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod agent;
mod job;
mod material;
mod pipeline;

pub use agent::AgentCommands;
pub use job::JobCommands;
pub use material::MaterialCommands;
pub use pipeline::PipelineCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline configuration and scheduling
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Job inspection and rescheduling
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Build agents
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
    /// Source control notifications
    Material {
        #[command(subcommand)]
        command: MaterialCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Agent { command } => agent::handle_agent_command(command, config).await,
        Commands::Material { command } => material::handle_material_command(command, config).await,
    }
}
