//! scopestore - unified CLI entrypoint.
//!
//! Usage:
//!   scopestore start --config config/scopestore.toml
//!   scopestore config validate --config config/scopestore.toml
//!   scopestore --bridge b1 kv set greeting hello --ttl 30
//!   scopestore --bridge b1 --instance i1 queue push jobs job-17
//!   scopestore lock acquire deploy --timeout 10

use anyhow::Result;
use clap::Parser;
use scopestore::cli::commands::{
    run_config, run_kv, run_lock, run_map, run_queue, run_start,
};
use scopestore::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Start(args) => run_start(args, config_path, cli.log_level).await,
        Commands::Config(args) => run_config(args, config_path),
        Commands::Kv(args) => run_kv(args, &cli.connection).await,
        Commands::Map(args) => run_map(args, &cli.connection).await,
        Commands::Queue(args) => run_queue(args, &cli.connection).await,
        Commands::Lock(args) => run_lock(args, &cli.connection).await,
    }
}
