//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: engine → sweeper → listener
//! - Shutdown order: listener → sweeper → engine

use crate::core::config::Config;
use crate::net::tcp::ListenerMetrics;
use crate::rpc::client::Client;
use crate::rpc::server::RpcServer;
use crate::rpc::service::Service;
use crate::store::sweeper::Sweeper;
use crate::store::Store;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Storage engine.
    pub engine: ComponentHealth,
    /// Expiry sweeper.
    pub sweeper: ComponentHealth,
    /// RPC listener.
    pub listener: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            engine: ComponentHealth::Starting,
            sweeper: ComponentHealth::Starting,
            listener: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        matches!(
            (self.engine, self.sweeper, self.listener),
            (
                ComponentHealth::Healthy,
                ComponentHealth::Healthy,
                ComponentHealth::Healthy
            )
        )
    }

    /// Check if the runtime is alive (not failed).
    pub fn is_alive(&self) -> bool {
        ![self.engine, self.sweeper, self.listener].contains(&ComponentHealth::Failed)
    }
}

/// Store runtime holding all component handles.
pub struct Runtime {
    config: Arc<Config>,

    store: Option<Store>,
    service: Option<Arc<Service>>,

    health: RuntimeHealth,
    running: Arc<AtomicBool>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    sweeper_handle: Option<JoinHandle<()>>,
    listener_handle: Option<JoinHandle<()>>,
    listener_metrics: Option<Arc<ListenerMetrics>>,
    local_addr: Option<SocketAddr>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            store: None,
            service: None,
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
            sweeper_handle: None,
            listener_handle: None,
            listener_metrics: None,
            local_addr: None,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the store (once started).
    pub fn store(&self) -> Option<&Store> {
        self.store.as_ref()
    }

    /// Address the listener is bound to (once started).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Listener counters (once started).
    pub fn listener_metrics(&self) -> Option<&Arc<ListenerMetrics>> {
        self.listener_metrics.as_ref()
    }

    /// In-process client bypassing the listener.
    pub fn local_client(&self) -> Option<Client> {
        let timeout = Duration::from_millis(self.config.store.request_timeout_ms);
        self.service
            .as_ref()
            .map(|service| Client::local(service.clone(), timeout))
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    /// Check if the runtime is alive.
    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Initialize and start all runtime components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(bind = %self.config.listener.bind, "starting scopestore runtime");

        self.init_engine();
        self.start_sweeper();
        self.start_listener().await?;

        self.running.store(true, Ordering::Release);
        tracing::info!("scopestore runtime started");
        Ok(())
    }

    fn init_engine(&mut self) {
        tracing::debug!("initializing storage engine");

        let store = Store::from_config(self.config.store.clone());
        self.service = Some(Arc::new(Service::from_store(store.clone())));
        self.store = Some(store);
        self.health.engine = ComponentHealth::Healthy;

        tracing::info!(
            global_ttl_s = self.config.store.default_global_ttl_seconds,
            bridge_ttl_s = self.config.store.default_bridge_ttl_seconds,
            instance_ttl_s = self.config.store.default_instance_ttl_seconds,
            "storage engine initialized"
        );
    }

    fn start_sweeper(&mut self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let sweeper = Sweeper::from_engine(store.engine().clone());
        self.sweeper_handle = Some(sweeper.spawn(self.shutdown_rx.clone()));
        self.health.sweeper = ComponentHealth::Healthy;
    }

    async fn start_listener(&mut self) -> Result<()> {
        let service = self
            .service
            .clone()
            .context("storage engine not initialized")?;

        let server = RpcServer::from_config(service, &self.config.listener, self.shutdown_rx.clone())
            .context("invalid listener configuration")?;

        let bound = match server.bind().await {
            Ok(bound) => bound,
            Err(e) => {
                self.health.listener = ComponentHealth::Failed;
                return Err(anyhow::Error::new(e).context("failed to start listener"));
            }
        };
        self.local_addr = Some(bound.local_addr());
        self.listener_metrics = Some(bound.metrics());
        self.listener_handle = Some(tokio::spawn(bound.serve()));
        self.health.listener = ComponentHealth::Healthy;

        tracing::info!(addr = ?self.local_addr, "listener started");
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for shutdown signal.
    pub async fn wait_for_shutdown(&mut self) {
        let mut rx = self.shutdown_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Run the runtime until SIGINT or an explicit shutdown.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop all runtime components in reverse start order.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping scopestore runtime");
        self.running.store(false, Ordering::Release);

        let _ = self.shutdown_tx.send(true);

        self.health.listener = ComponentHealth::Stopping;
        if let Some(handle) = self.listener_handle.take() {
            join_component("listener", handle).await;
        }
        self.health.listener = ComponentHealth::Stopped;

        self.health.sweeper = ComponentHealth::Stopping;
        if let Some(handle) = self.sweeper_handle.take() {
            join_component("sweeper", handle).await;
        }
        self.health.sweeper = ComponentHealth::Stopped;

        self.health.engine = ComponentHealth::Stopping;
        if let Some(store) = self.store.take() {
            tracing::info!(
                entries = store.engine().entry_count(),
                locks = store.engine().lock_count(),
                "dropping storage engine"
            );
        }
        self.service = None;
        self.health.engine = ComponentHealth::Stopped;

        tracing::info!("scopestore runtime stopped");
        Ok(())
    }

    /// Start the engine and sweeper without a listener or signal handling.
    pub async fn start_for_tests(&mut self) -> Result<()> {
        self.init_engine();
        self.start_sweeper();
        self.running.store(true, Ordering::Release);
        Ok(())
    }
}

async fn join_component(name: &str, handle: JoinHandle<()>) {
    match tokio::time::timeout(Duration::from_secs(5), handle).await {
        Ok(Ok(())) => tracing::info!(component = name, "stopped"),
        Ok(Err(e)) => tracing::warn!(component = name, error = %e, "task panicked"),
        Err(_) => tracing::warn!(component = name, "stop timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.listener.bind = "127.0.0.1:0".into();
        config
    }

    #[test]
    fn test_health_readiness() {
        let mut health = RuntimeHealth::default();
        assert!(!health.is_ready());
        assert!(health.is_alive());

        health.engine = ComponentHealth::Healthy;
        health.sweeper = ComponentHealth::Healthy;
        health.listener = ComponentHealth::Healthy;
        assert!(health.is_ready());

        health.sweeper = ComponentHealth::Failed;
        assert!(!health.is_ready());
        assert!(!health.is_alive());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = test_config();
        config.store.expired_gc_period_seconds = 0;
        assert!(Runtime::new(config).is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut runtime = Runtime::new(test_config()).unwrap();
        runtime.start().await.unwrap();
        assert!(runtime.is_running());
        assert!(runtime.is_ready());
        assert_ne!(runtime.local_addr().unwrap().port(), 0);

        runtime.stop().await.unwrap();
        assert!(!runtime.is_running());
        assert_eq!(runtime.health().listener, ComponentHealth::Stopped);
        assert!(runtime.store().is_none());
    }

    #[tokio::test]
    async fn test_local_client_after_start_for_tests() {
        let mut runtime = Runtime::new(test_config()).unwrap();
        assert!(runtime.local_client().is_none());

        runtime.start_for_tests().await.unwrap();
        let client = runtime.local_client().unwrap();
        client.connect().await.unwrap();
        client.global().kv().set("k", "v", 0).await.unwrap();
        assert_eq!(
            runtime.store().unwrap().engine().entry_count(),
            1
        );
        runtime.stop().await.unwrap();
    }
}
