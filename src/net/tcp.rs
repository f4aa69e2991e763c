//! TCP acceptor for the RPC listener.
//!
//! [`Acceptor`] owns the bound socket. It hands out connections tagged with a
//! [`ConnectionId`], turns away connections over the configured cap and
//! yields `None` once shutdown is signalled.

use crate::core::config::ListenerConfig;
use crate::core::error::{StoreError, StoreResult};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Socket-level listener settings.
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Connections served at once; extra ones are closed on accept.
    pub max_connections: usize,
    /// Connection idle timeout.
    pub idle_timeout: Duration,
    /// Initial per-connection read buffer.
    pub read_buffer_size: usize,
}

impl AcceptorConfig {
    /// Build from the `[listener]` section.
    pub fn from_config(config: &ListenerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            bind_addr: config.bind_addr()?,
            max_connections: config.max_connections,
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
            read_buffer_size: 16 * 1024,
        })
    }

    /// Loopback on an ephemeral port with default limits.
    pub fn loopback() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_connections: 1_024,
            idle_timeout: Duration::from_secs(300),
            read_buffer_size: 16 * 1024,
        }
    }
}

/// Connection identifier, unique per acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A connection admitted under the cap.
#[derive(Debug)]
pub struct Accepted {
    /// Connection id.
    pub id: ConnectionId,
    /// Peer address.
    pub peer: SocketAddr,
    /// Socket, with nodelay set.
    pub stream: TcpStream,
}

/// Listener counters, shared with connection tasks.
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    /// Connections admitted since start.
    pub connections_total: AtomicU64,
    /// Connections currently open.
    pub connections_active: AtomicU64,
    /// Connections closed on accept because the cap was reached.
    pub connections_rejected: AtomicU64,
    /// Bytes read from clients.
    pub bytes_received: AtomicU64,
    /// Bytes written to clients.
    pub bytes_sent: AtomicU64,
}

impl ListenerMetrics {
    /// Count a closed connection.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Count bytes read.
    pub fn record_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count bytes written.
    pub fn record_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Open connections.
    pub fn active_connections(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }
}

/// Bound socket plus admission control.
#[derive(Debug)]
pub struct Acceptor {
    socket: TcpListener,
    local_addr: SocketAddr,
    max_connections: u64,
    next_id: AtomicU64,
    shutdown_rx: watch::Receiver<bool>,
    metrics: Arc<ListenerMetrics>,
}

impl Acceptor {
    /// Bind `config.bind_addr`; port 0 picks an ephemeral port.
    pub async fn bind(
        config: &AcceptorConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> StoreResult<Self> {
        let socket = TcpListener::bind(config.bind_addr).await.map_err(|e| {
            StoreError::internal(format!("failed to bind to {}: {}", config.bind_addr, e))
        })?;
        let local_addr = socket.local_addr().map_err(StoreError::transport)?;

        Ok(Self {
            socket,
            local_addr,
            max_connections: config.max_connections as u64,
            next_id: AtomicU64::new(1),
            shutdown_rx,
            metrics: Arc::new(ListenerMetrics::default()),
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared counters.
    pub fn metrics(&self) -> &Arc<ListenerMetrics> {
        &self.metrics
    }

    /// Wait for the next admitted connection, or `None` on shutdown.
    ///
    /// Connections arriving at the cap are closed and counted, and the wait
    /// continues.
    pub async fn accept(&self) -> StoreResult<Option<Accepted>> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow() {
                return Ok(None);
            }

            let (stream, peer) = tokio::select! {
                result = self.socket.accept() => {
                    result.map_err(|e| StoreError::internal(format!("accept failed: {}", e)))?
                }
                _ = shutdown_rx.changed() => return Ok(None),
            };

            if self.metrics.active_connections() >= self.max_connections {
                self.metrics
                    .connections_rejected
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%peer, limit = self.max_connections, "connection limit reached");
                continue;
            }

            let _ = stream.set_nodelay(true);
            self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
            self.metrics.connections_active.fetch_add(1, Ordering::Relaxed);
            let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
            return Ok(Some(Accepted { id, peer, stream }));
        }
    }
}
