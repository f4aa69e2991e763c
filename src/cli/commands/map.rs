//! Map container commands.

use super::session::{open, print_ok, print_value};
use crate::cli::ConnectionArgs;
use anyhow::Result;
use clap::{Args, Subcommand};

/// Map containers.
#[derive(Args, Debug)]
pub struct MapArgs {
    #[command(subcommand)]
    pub command: MapCommand,
}

/// Map subcommands.
#[derive(Subcommand, Debug)]
pub enum MapCommand {
    /// Create (or reset) an empty map.
    New {
        key: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        ttl: i32,
    },
    /// Delete a map.
    Del { key: String },
    /// Set a field.
    Set {
        key: String,
        field: String,
        value: String,
    },
    /// Read a field.
    Get { key: String, field: String },
    /// Delete a field.
    FieldDel { key: String, field: String },
    /// Increment a numeric field.
    Incr {
        key: String,
        field: String,
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        n: i32,
    },
    /// Decrement a numeric field.
    Decr {
        key: String,
        field: String,
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        n: i32,
    },
    /// Print every field.
    All { key: String },
    /// Print the field count.
    Len { key: String },
}

/// Run a map command.
pub async fn run_map(args: MapArgs, connection: &ConnectionArgs) -> Result<()> {
    let maps = open(connection).await?.map();
    match args.command {
        MapCommand::New { key, ttl } => {
            maps.create(&key, ttl).await?;
            print_ok();
        }
        MapCommand::Del { key } => {
            maps.del(&key).await?;
            print_ok();
        }
        MapCommand::Set { key, field, value } => {
            maps.fields(&key).set(&field, value).await?;
            print_ok();
        }
        MapCommand::Get { key, field } => print_value(&maps.fields(&key).get(&field).await?),
        MapCommand::FieldDel { key, field } => {
            maps.fields(&key).del(&field).await?;
            print_ok();
        }
        MapCommand::Incr { key, field, n } => {
            println!("{}", maps.fields(&key).incr(&field, n).await?)
        }
        MapCommand::Decr { key, field, n } => {
            println!("{}", maps.fields(&key).decr(&field, n).await?)
        }
        MapCommand::All { key } => {
            for (field, value) in maps.fields(&key).all().await? {
                println!("{}\t{}", field, String::from_utf8_lossy(&value));
            }
        }
        MapCommand::Len { key } => println!("{}", maps.fields(&key).len().await?),
    }
    Ok(())
}
