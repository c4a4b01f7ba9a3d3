//! `coordinatord`: the blobcoord coordinator daemon and its operator CLI.

mod commands;
mod topology;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coordinatord")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator's HTTP ingress and serve Get requests.
    Run {
        /// Directory to load coordinator.toml / coordinator.local.toml
        /// from, instead of the platform's default config directories.
        #[arg(long)]
        config_dir: Option<PathBuf>,

        /// Path to the cluster topology file describing partitions,
        /// replicas, and their addresses.
        #[arg(long, default_value = "topology.toml")]
        topology: PathBuf,
    },

    /// Print the effective, merged configuration and exit.
    Config {
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },

    /// Show version information.
    Version,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config_dir, topology } => commands::run::run(config_dir.as_deref(), &topology),
        Commands::Config { config_dir } => commands::config::run(config_dir.as_deref()),
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
