//! Config command implementation.

use super::start::load_config;
use crate::core::config::ConfigOverrides;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print the effective configuration with defaults and overrides applied.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &ConfigOverrides::default())?;
    match args.command {
        ConfigCommand::Validate => {
            match config_path {
                Some(path) => println!("✓ {} is valid", path.display()),
                None => println!("✓ default configuration is valid"),
            }
            Ok(())
        }
        ConfigCommand::Show { format } => {
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&config)?),
                "toml" => print!("{}", config.to_toml()?),
                other => anyhow::bail!("unknown format: {} (expected toml or json)", other),
            }
            Ok(())
        }
    }
}
