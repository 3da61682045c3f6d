//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for CraftRelay.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "craftrelay")]
#[command(about = "CraftRelay game session relay")]
#[command(long_about = "Drive several game sessions from a chat channel and relay their events back")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Dry-run mode: show the configuration summary without connecting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Connect to the chat gateway and serve commands
    #[command(hide = true)]
    Run,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Show the effective configuration with secrets redacted
    Show,

    /// Load and validate the configuration
    Check,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the actual command, using default if none provided
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }

    /// Adjust log level based on the verbose flag, falling back to `configured`
    pub fn effective_log_level(&self, configured: &str) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.to_string())
        }
    }

    /// Check if we're running in dry-run mode
    pub fn is_dry_run_mode(&self) -> bool {
        self.dry_run
    }
}
