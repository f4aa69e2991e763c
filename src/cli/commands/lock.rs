//! Advisory lock commands.

use super::session::{open, print_ok};
use crate::cli::ConnectionArgs;
use anyhow::Result;
use clap::{Args, Subcommand};

/// Advisory locks.
#[derive(Args, Debug)]
pub struct LockArgs {
    #[command(subcommand)]
    pub command: LockCommand,
}

/// Lock subcommands.
#[derive(Subcommand, Debug)]
pub enum LockCommand {
    /// Acquire a lock and print its release token.
    Acquire {
        key: String,
        /// Lock lifetime in seconds; 0 uses the server default.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        timeout: i32,
    },
    /// Release a lock.
    Release { key: String, release_token: String },
}

/// Run a lock command.
pub async fn run_lock(args: LockArgs, connection: &ConnectionArgs) -> Result<()> {
    let locks = open(connection).await?.lock();
    match args.command {
        LockCommand::Acquire { key, timeout } => println!("{}", locks.lock(&key, timeout).await?),
        LockCommand::Release { key, release_token } => {
            locks.unlock(&key, &release_token).await?;
            print_ok();
        }
    }
    Ok(())
}
