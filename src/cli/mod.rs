//! Command-line interface.
//!
//! `start` and `config` act on the local configuration; `kv`, `map`, `queue`
//! and `lock` talk to a running server through the client facade.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Ephemeral scope-partitioned key/value store.
#[derive(Parser, Debug)]
#[command(name = "scopestore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where client commands connect and which scope they address.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Server address.
    #[arg(long, global = true, env = "SCOPESTORE_SERVER", default_value = "127.0.0.1:8080")]
    pub server: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 5_000)]
    pub timeout_ms: u64,

    /// Bridge identifier; selects the bridge scope.
    #[arg(long, global = true)]
    pub bridge: Option<String>,

    /// Instance identifier; with --bridge selects the instance scope.
    #[arg(long, global = true)]
    pub instance: Option<String>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server.
    Start(commands::StartArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Scalar values.
    Kv(commands::KvArgs),
    /// Map containers.
    Map(commands::MapArgs),
    /// Queue containers.
    Queue(commands::QueueArgs),
    /// Advisory locks.
    Lock(commands::LockArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scoped_client_command() {
        let cli = Cli::try_parse_from([
            "scopestore",
            "--bridge",
            "b1",
            "kv",
            "set",
            "k",
            "v",
            "--ttl",
            "10",
            "--server",
            "10.0.0.1:9000",
        ])
        .unwrap();
        assert_eq!(cli.connection.bridge.as_deref(), Some("b1"));
        assert_eq!(cli.connection.server, "10.0.0.1:9000");
        assert!(matches!(cli.command, Commands::Kv(_)));
    }

    #[test]
    fn test_parse_start_with_bind() {
        let cli = Cli::try_parse_from([
            "scopestore",
            "start",
            "--config",
            "store.toml",
            "--bind",
            "127.0.0.1:9999",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("store.toml")));
        match cli.command {
            Commands::Start(args) => assert_eq!(args.bind.as_deref(), Some("127.0.0.1:9999")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_negative_delta_accepted() {
        let cli = Cli::try_parse_from(["scopestore", "kv", "incr", "n", "-5"]).unwrap();
        assert!(matches!(cli.command, Commands::Kv(_)));
    }
}
