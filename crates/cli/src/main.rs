//! Edge Rebalancer CLI
//!
//! A command-line tool for inspecting the rebalancer's node and container
//! inventory, triggering inventory refreshes and checking component health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, inventory};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Edge Rebalancer CLI
#[derive(Parser)]
#[command(name = "rbctl")]
#[command(author, version, about = "CLI for the Edge Rebalancer", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via RBCTL_API_URL env var)
    #[arg(long, env = "RBCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List nodes and their capacity
    Nodes,

    /// List monitored containers
    Containers {
        /// Only show containers placed on this node
        #[arg(long, short)]
        node: Option<String>,
    },

    /// Re-fetch the container inventory now
    Refresh,

    /// Show component health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let saved = config::Config::load()?;

    // Flags and env win over the config file
    let api_url = cli
        .api_url
        .or(saved.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let format = match cli.format {
        Some(format) => format,
        None => saved.default_format()?,
    };

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Nodes => inventory::list_nodes(&client, format).await?,
        Commands::Containers { node } => {
            inventory::list_containers(&client, node.as_deref(), format).await?
        }
        Commands::Refresh => inventory::refresh(&client, format).await?,
        Commands::Health => health::show_health(&client, format).await?,
    }

    Ok(())
}
