//! Shared client setup for the data commands.

use crate::cli::ConnectionArgs;
use crate::rpc::client::{Client, Scoped};
use crate::store::scope::ScopeLocator;
use anyhow::{Context, Result};
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;

/// Connect to the server and bind the scope selected by `--bridge`/`--instance`.
pub(crate) async fn open(connection: &ConnectionArgs) -> Result<Scoped> {
    let addr: SocketAddr = connection
        .server
        .parse()
        .with_context(|| format!("invalid server address: {}", connection.server))?;
    let client = Client::new(addr, Duration::from_millis(connection.timeout_ms));
    client
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let scope = ScopeLocator::from_ids(
        connection.bridge.as_deref(),
        connection.instance.as_deref(),
    );
    Ok(client.scoped(scope))
}

/// Print a stored value, lossily decoded as UTF-8.
pub(crate) fn print_value(value: &Bytes) {
    println!("{}", String::from_utf8_lossy(value));
}

pub(crate) fn print_ok() {
    println!("OK");
}
