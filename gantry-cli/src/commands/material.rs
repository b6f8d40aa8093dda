//! Material command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;

use crate::config::Config;

/// Material subcommands
#[derive(Subcommand)]
pub enum MaterialCommands {
    /// Notify the orchestrator of a push to a git repository
    Notify {
        /// Repository URL
        #[arg(long)]
        git: String,
    },
}

/// Handle material commands
pub async fn handle_material_command(command: MaterialCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        MaterialCommands::Notify { git } => {
            let response = client.notify_git(&git).await?;

            if response.pipelines.is_empty() {
                println!("{}", "No pipeline builds from this repository.".yellow());
            } else {
                println!(
                    "{}",
                    format!("{} pipeline(s) use this repository:", response.pipelines.len())
                        .bold()
                );
                for pipeline in response.pipelines {
                    println!("  {} {}", "▸".cyan(), pipeline);
                }
            }

            Ok(())
        }
    }
}
