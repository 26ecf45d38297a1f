//! Cluster State CLI
//!
//! A command-line tool for inspecting the cluster state cache served by the
//! cluster state agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cluster, health, nodes, pods};

/// Cluster State CLI
#[derive(Parser)]
#[command(name = "kstate")]
#[command(author, version, about = "CLI for the Cluster State cache", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via KSTATE_API_URL env var)
    #[arg(long, env = "KSTATE_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show cluster-wide totals
    Summary,

    /// List tracked nodes in creation order
    Nodes,

    /// Show one node and the pods attributed to it
    Node {
        /// Node name
        name: String,
    },

    /// List pods that are not bound to a node
    Pods,

    /// Show agent health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = config::Config::load()?;
    let api_url = file_config.resolve_api_url(cli.api_url);
    let format = file_config.resolve_format(cli.format);
    if cli.verbose {
        eprintln!("Using API at {}", api_url);
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Summary => cluster::show_summary(&client, format).await?,
        Commands::Nodes => nodes::list_nodes(&client, format).await?,
        Commands::Node { name } => nodes::show_node(&client, &name, format).await?,
        Commands::Pods => pods::list_unbound_pods(&client, format).await?,
        Commands::Health => health::show_health(&client, format).await?,
    }

    Ok(())
}
