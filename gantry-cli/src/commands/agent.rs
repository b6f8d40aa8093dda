//! Agent command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use gantry_core::domain::agent::AgentRuntimeStatus;
use gantry_core::dto::agent::AgentSummary;

use crate::config::Config;
use gantry_client::OrchestratorClient;

/// Agent subcommands
#[derive(Subcommand)]
pub enum AgentCommands {
    /// List all known agents
    List,
}

/// Handle agent commands
pub async fn handle_agent_command(command: AgentCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        AgentCommands::List => list_agents(&client).await,
    }
}

async fn list_agents(client: &OrchestratorClient) -> Result<()> {
    let agents = client.list_agents().await?;

    if agents.is_empty() {
        println!("{}", "No agents have pinged yet.".yellow());
    } else {
        println!("{}", format!("Found {} agent(s):", agents.len()).bold());
        println!();
        for agent in agents {
            print_agent_summary(&agent);
        }
    }

    Ok(())
}

fn print_agent_summary(agent: &AgentSummary) {
    println!("  {} Agent {}", "▸".cyan(), agent.uuid.bold());
    println!("    Host:     {} ({})", agent.hostname, agent.ip_address.dimmed());
    println!("    Status:   {}", colorize_status(agent.status));
    println!("    Location: {}", agent.location);
    if let Some(space) = agent.usable_space {
        println!("    Free:     {}", format_bytes(space));
    }
    if let Some(os) = &agent.operating_system {
        println!("    OS:       {}", os.dimmed());
    }
    println!();
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Colorize agent status for display
fn colorize_status(status: AgentRuntimeStatus) -> colored::ColoredString {
    let status_str = status.to_string();
    match status {
        AgentRuntimeStatus::Idle => status_str.green(),
        AgentRuntimeStatus::Building => status_str.cyan(),
        AgentRuntimeStatus::LostContact | AgentRuntimeStatus::Missing => status_str.red(),
        AgentRuntimeStatus::Cancelled | AgentRuntimeStatus::Unknown => status_str.dimmed(),
    }
}
