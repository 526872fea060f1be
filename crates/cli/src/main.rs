//! Brook CLI — the main entry point.
//!
//! Commands:
//! - `serve`  — Start the HTTP chat backend
//! - `config` — Print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "brook",
    about = "Brook — streaming conversational backend with web search",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a config file (defaults to ~/.brook/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat backend
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the database path
        #[arg(long)]
        db: Option<String>,
    },

    /// Print the effective configuration (secrets redacted)
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            let mut c = brook_config::AppConfig::load_from(path)?;
            c.apply_env_overrides();
            c
        }
        None => brook_config::AppConfig::load()?,
    };

    match cli.command {
        Commands::Serve { port, host, db } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(db) = db {
                config.database.path = db;
            }

            if !config.has_api_key() {
                tracing::warn!(
                    "No model API key configured — set BROOK_API_KEY or api_key in config.toml"
                );
            }

            brook_gateway::serve(config).await?;
        }
        Commands::Config => {
            println!("{config:#?}");
        }
    }

    Ok(())
}
