//! Command-line interface definition for the outpost
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to run the server and to check a configuration file.

use clap::{Parser, Subcommand};

/// outpost-auth - forward-auth outpost for OAuth2/OIDC protected applications
#[derive(Parser, Debug, Clone)]
#[command(name = "outpost-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "OUTPOST_CONFIG", default_value = "config/outpost.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the outpost HTTP server
    Serve {
        /// Override the listen address from config
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Load and validate the configuration, then print a summary
    CheckConfig,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/outpost.yaml".to_string()),
            verbose: false,
            command: Commands::Serve { listen: None },
        }
    }
}
