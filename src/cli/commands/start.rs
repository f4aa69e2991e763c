//! Start command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

/// Config file used when `--config` is not given and it exists.
const DEFAULT_CONFIG_PATH: &str = "config/scopestore.toml";

/// Start the server.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Override the listener bind address.
    #[arg(long)]
    pub bind: Option<String>,
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` wins over the configured level.
#[cfg(feature = "telemetry")]
fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(_default_level: &str) {}

/// Load the effective configuration: file (or defaults), then environment,
/// then CLI overrides. The result is validated.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                Config::from_file(&default_path)?
            } else {
                Config::default()
            }
        }
    };

    config.apply_env()?;
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Run the server until SIGINT.
pub async fn run_start(
    args: StartArgs,
    config_path: Option<&Path>,
    log_level: Option<String>,
) -> Result<()> {
    let overrides = ConfigOverrides {
        log_level,
        bind: args.bind,
    };
    let config = load_config(config_path, &overrides)?;
    init_tracing(&config.telemetry.log_level);

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}
