//! Scope-partitioned storage.
//!
//! - [`scope`] - Scope validation and key tokenization
//! - [`engine`] - Token table, expiry and lock namespace
//! - [`sweeper`] - Periodic removal of expired records
//! - [`scalar`], [`map`], [`queue`] - Structure adapters
//! - [`lock`] - Advisory locks with release tokens
//!
//! [`Store`] bundles one engine with the four adapters built on it.

pub mod engine;
pub mod lock;
pub mod map;
pub mod queue;
pub mod scalar;
pub mod scope;
pub mod sweeper;

use crate::core::config::StoreConfig;
use crate::core::time::{Clock, SystemClock};
use std::sync::Arc;

pub use engine::StorageEngine;
pub use lock::LockManager;
pub use map::MapStore;
pub use queue::QueueStore;
pub use scalar::ScalarStore;
pub use scope::{tokenize, Location, ScopeKind, ScopeLocator, Token};

/// One engine and the adapters sharing it.
#[derive(Debug, Clone)]
pub struct Store {
    engine: Arc<StorageEngine>,
    scalar: ScalarStore,
    map: MapStore,
    queue: QueueStore,
    locks: LockManager,
}

impl Store {
    /// Build the adapters over an existing engine.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self {
            scalar: ScalarStore::new(engine.clone()),
            map: MapStore::new(engine.clone()),
            queue: QueueStore::new(engine.clone()),
            locks: LockManager::new(engine.clone()),
            engine,
        }
    }

    /// Create a store with its own engine on `clock`.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(StorageEngine::new(config, clock)))
    }

    /// Create a store with its own engine on the wall clock.
    pub fn from_config(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Shared engine.
    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    /// Scalar adapter.
    pub fn scalar(&self) -> &ScalarStore {
        &self.scalar
    }

    /// Map adapter.
    pub fn map(&self) -> &MapStore {
        &self.map
    }

    /// Queue adapter.
    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    /// Lock manager.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }
}
