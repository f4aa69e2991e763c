//! Scalar value commands.

use super::session::{open, print_ok, print_value};
use crate::cli::ConnectionArgs;
use anyhow::Result;
use clap::{Args, Subcommand};

/// Scalar values.
#[derive(Args, Debug)]
pub struct KvArgs {
    #[command(subcommand)]
    pub command: KvCommand,
}

/// Scalar subcommands.
#[derive(Subcommand, Debug)]
pub enum KvCommand {
    /// Store a value.
    Set {
        key: String,
        value: String,
        /// TTL in seconds; 0 uses the scope default.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        ttl: i32,
    },
    /// Read a value.
    Get { key: String },
    /// Delete a value.
    Del { key: String },
    /// Increment a numeric value.
    Incr {
        key: String,
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        n: i32,
    },
    /// Decrement a numeric value.
    Decr {
        key: String,
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        n: i32,
    },
}

/// Run a scalar command.
pub async fn run_kv(args: KvArgs, connection: &ConnectionArgs) -> Result<()> {
    let kv = open(connection).await?.kv();
    match args.command {
        KvCommand::Set { key, value, ttl } => {
            kv.set(&key, value, ttl).await?;
            print_ok();
        }
        KvCommand::Get { key } => print_value(&kv.get(&key).await?),
        KvCommand::Del { key } => {
            kv.del(&key).await?;
            print_ok();
        }
        KvCommand::Incr { key, n } => println!("{}", kv.incr(&key, n).await?),
        KvCommand::Decr { key, n } => println!("{}", kv.decr(&key, n).await?),
    }
    Ok(())
}
