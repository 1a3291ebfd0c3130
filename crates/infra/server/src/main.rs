//! Gridhook server binary.

use clap::Parser;
use gridhook_server::{GridhookConfig, GridhookServer, init_tracing, load_config};
use std::path::PathBuf;

/// Event Grid webhook receiver.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "GRIDHOOK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GridhookConfig::default(),
    }
    .with_env_overrides();

    init_tracing(&config.server.log_level);
    if cli.config.is_none() {
        tracing::warn!("No configuration file given, using defaults");
    }

    // Create and run server
    let server = GridhookServer::new(config)?;
    server.run().await?;

    Ok(())
}
