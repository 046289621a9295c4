//! hostwatch CLI
//!
//! A command-line tool for inspecting a running hostwatch agent: live
//! detector status, the anomaly timeline and its statistics.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{status, timeline};
use std::path::PathBuf;

/// hostwatch CLI
#[derive(Parser)]
#[command(name = "hwctl")]
#[command(author, version, about = "CLI for the hostwatch anomaly agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via HWCTL_API_URL env var)
    #[arg(long, env = "HWCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest value, z-score and alert state per metric
    Status,

    /// List recent anomaly events, most recent first
    Timeline {
        /// Maximum number of events to show
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show anomaly statistics
    Stats,

    /// Clear the agent's anomaly timeline
    Clear,

    /// Export the anomaly timeline to a file
    Export {
        /// Output file path
        #[arg(long, short)]
        output: PathBuf,

        /// Write CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },

    /// Show the agent's detector configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let api_url = config::Config::load()?.api_url(cli.api_url);

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Timeline { limit } => {
            timeline::show_timeline(&client, limit, cli.format).await?
        }
        Commands::Stats => timeline::show_stats(&client, cli.format).await?,
        Commands::Clear => timeline::clear_timeline(&client, cli.format).await?,
        Commands::Export { output, csv } => {
            timeline::export_timeline(&client, &output, csv).await?
        }
        Commands::Config => status::show_config(&client, cli.format).await?,
    }

    Ok(())
}
