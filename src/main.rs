mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vigil::config::VigilConfig;
use vigil::server;

#[derive(Parser)]
#[command(
    name = "vigil",
    version,
    about = "Session coordination and stuck-detection MCP server"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (transport from config: stdio or http)
    Serve,
    /// Manage the local embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Report how long a project directory has gone without file changes
    Idle {
        /// Project directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.vigil/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = VigilConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve(config).await?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
        Command::Idle { path } => {
            cli::idle(path, &config.detection).await?;
        }
    }

    Ok(())
}
