pub mod commands;
pub mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file in addition to stdout
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape room availability for this instance's shard of the link list
    Scrape(ScrapeArgs),

    /// Show the current configuration
    Config {
        /// Write the built-in defaults to the config directory
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
pub struct ScrapeArgs {
    /// File with one hotel detail-page URL per line
    #[arg(required = true)]
    pub links_file: PathBuf,

    /// Number of cooperating application instances
    #[arg(long)]
    pub total_shards: Option<usize>,

    /// 0-based index of this instance
    #[arg(long)]
    pub shard_index: Option<usize>,

    /// Concurrent browser workers (default: CPU cores minus one)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Per-task timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Override the browser user agent
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Skip image loading in the browser
    #[arg(long)]
    pub disable_images: bool,

    /// Keep results in memory instead of writing to the database
    #[arg(long)]
    pub dry_run: bool,

    /// Path to an alternative configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scrape(args) => {
            info!("Starting shard scrape from {}", args.links_file.display());
            commands::scrape(args).await
        }
        Commands::Config { init } => {
            if init {
                info!("Writing default configuration");
                commands::init_config().await
            } else {
                commands::show_config().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }
}
