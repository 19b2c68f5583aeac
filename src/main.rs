//! outpost-auth - forward-auth outpost
//!
#![doc = "outpost-auth - forward-auth outpost"]
#![doc = "Main entry point for the outpost server."]

use anyhow::Result;

use outpost_auth::cli::{Cli, Commands};
use outpost_auth::config::Config;
use outpost_auth::logging::init_logging;
use outpost_auth::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/outpost.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing from the loaded logging settings
    init_logging(&config.logging)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!(
                applications = config.applications.len(),
                "Starting outpost"
            );
            if config.applications.is_empty() {
                tracing::warn!("No applications configured, every request will be answered with 404");
            }
            server::run(config).await?;
            Ok(())
        }
        Commands::CheckConfig => {
            println!("Configuration OK: {}", config_path);
            println!("  listen: {}", config.listen);
            if config.debug.enabled {
                println!("  diagnostics: {}", config.debug.listen);
            }
            for app in &config.applications {
                println!(
                    "  - {} ({}) {} -> {}",
                    app.name, app.mode, app.external_host, app.provider.issuer
                );
            }
            Ok(())
        }
    }
}
