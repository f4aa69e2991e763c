//! Queue container commands.

use super::session::{open, print_ok, print_value};
use crate::cli::ConnectionArgs;
use anyhow::Result;
use clap::{Args, Subcommand};

/// Queue containers.
#[derive(Args, Debug)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommand,
}

/// Queue subcommands.
#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Create (or reset) an empty queue.
    New {
        key: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        ttl: i32,
    },
    /// Delete a queue.
    Del { key: String },
    /// Append an item at the tail.
    Push { key: String, value: String },
    /// Remove and print the head item.
    Pop { key: String },
    /// Print the head item.
    Peek { key: String },
    /// Print the item at a position, 0 being the head.
    Index {
        key: String,
        #[arg(allow_negative_numbers = true)]
        index: i32,
    },
    /// Print every item, head first.
    All { key: String },
    /// Print the item count.
    Len { key: String },
}

/// Run a queue command.
pub async fn run_queue(args: QueueArgs, connection: &ConnectionArgs) -> Result<()> {
    let queues = open(connection).await?.queue();
    match args.command {
        QueueCommand::New { key, ttl } => {
            queues.create(&key, ttl).await?;
            print_ok();
        }
        QueueCommand::Del { key } => {
            queues.del(&key).await?;
            print_ok();
        }
        QueueCommand::Push { key, value } => {
            queues.items(&key).push(value).await?;
            print_ok();
        }
        QueueCommand::Pop { key } => print_value(&queues.items(&key).pop().await?),
        QueueCommand::Peek { key } => print_value(&queues.items(&key).peek().await?),
        QueueCommand::Index { key, index } => {
            print_value(&queues.items(&key).index(index).await?)
        }
        QueueCommand::All { key } => {
            for item in queues.items(&key).all().await? {
                print_value(&item);
            }
        }
        QueueCommand::Len { key } => println!("{}", queues.items(&key).len().await?),
    }
    Ok(())
}
