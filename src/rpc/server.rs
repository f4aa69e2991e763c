//! RPC accept loop.

use super::service::{ConnectionSettings, Service};
use crate::core::config::ListenerConfig;
use crate::core::error::StoreResult;
use crate::net::tcp::{Acceptor, AcceptorConfig, ListenerMetrics};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// TCP server for one [`Service`].
pub struct RpcServer {
    service: Arc<Service>,
    acceptor_config: AcceptorConfig,
    settings: ConnectionSettings,
    shutdown_rx: watch::Receiver<bool>,
}

/// A server whose socket is bound and ready to accept.
pub struct BoundServer {
    service: Arc<Service>,
    acceptor: Acceptor,
    settings: ConnectionSettings,
    shutdown_rx: watch::Receiver<bool>,
}

impl RpcServer {
    /// Create a server from listener settings.
    pub fn new(
        service: Arc<Service>,
        acceptor_config: AcceptorConfig,
        max_frame_bytes: usize,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let settings = ConnectionSettings {
            idle_timeout: acceptor_config.idle_timeout,
            max_frame_bytes,
            read_buffer_size: acceptor_config.read_buffer_size,
        };
        Self {
            service,
            acceptor_config,
            settings,
            shutdown_rx,
        }
    }

    /// Create a server from the `[listener]` section.
    pub fn from_config(
        service: Arc<Service>,
        config: &ListenerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let acceptor_config = AcceptorConfig::from_config(config)?;
        Ok(Self::new(
            service,
            acceptor_config,
            config.max_frame_bytes,
            shutdown_rx,
        ))
    }

    /// Bind the socket.
    pub async fn bind(self) -> StoreResult<BoundServer> {
        let acceptor = Acceptor::bind(&self.acceptor_config, self.shutdown_rx.clone()).await?;
        tracing::info!(addr = %acceptor.local_addr(), "rpc listener bound");
        Ok(BoundServer {
            service: self.service,
            acceptor,
            settings: self.settings,
            shutdown_rx: self.shutdown_rx,
        })
    }
}

impl BoundServer {
    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    /// Listener counters.
    pub fn metrics(&self) -> Arc<ListenerMetrics> {
        self.acceptor.metrics().clone()
    }

    /// Accept connections until shutdown.
    pub async fn serve(self) {
        loop {
            match self.acceptor.accept().await {
                Ok(Some(conn)) => {
                    tracing::debug!(connection = %conn.id, peer = %conn.peer, "accepted");
                    let service = self.service.clone();
                    let metrics = self.acceptor.metrics().clone();
                    let shutdown_rx = self.shutdown_rx.clone();
                    let settings = self.settings;
                    tokio::spawn(async move {
                        service
                            .handle_connection(
                                conn.stream,
                                conn.id,
                                settings,
                                Some(metrics.clone()),
                                shutdown_rx,
                            )
                            .await;
                        metrics.connection_closed();
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }

        tracing::info!("rpc listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StoreConfig;
    use crate::store::Store;

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port_and_stops() {
        let (tx, rx) = watch::channel(false);
        let service = Arc::new(Service::from_store(Store::from_config(
            StoreConfig::default(),
        )));
        let bound = RpcServer::new(service, AcceptorConfig::loopback(), 1 << 20, rx)
            .bind()
            .await
            .unwrap();
        assert_ne!(bound.local_addr().port(), 0);

        let task = tokio::spawn(bound.serve());
        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
