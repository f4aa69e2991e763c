//! Scalar key/value adapter.
//!
//! Every call, including reads and deletes, validates and tokenizes the
//! location before touching the engine.

use crate::core::error::StoreResult;
use crate::core::time::Deadline;
use crate::store::engine::StorageEngine;
use crate::store::scope::Location;
use bytes::Bytes;
use std::sync::Arc;

/// Scalar operations over the shared engine.
#[derive(Debug, Clone)]
pub struct ScalarStore {
    engine: Arc<StorageEngine>,
}

impl ScalarStore {
    /// Create a scalar adapter.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Write `value`; `ttl_seconds == 0` uses the scope default.
    pub fn set(
        &self,
        location: &Location,
        value: Bytes,
        ttl_seconds: i32,
        deadline: Deadline,
    ) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine.set(&token, value, ttl_seconds, deadline)
    }

    /// Read the value.
    pub fn get(&self, location: &Location, deadline: Deadline) -> StoreResult<Bytes> {
        let token = location.tokenize()?;
        self.engine.get(&token, deadline)
    }

    /// Remove the key; absence is not an error.
    pub fn del(&self, location: &Location, deadline: Deadline) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine.del(&token, deadline).map(|_| ())
    }

    /// Add `n` and return the new value.
    pub fn incr(&self, location: &Location, n: i32, deadline: Deadline) -> StoreResult<i64> {
        let token = location.tokenize()?;
        self.engine.incr(&token, i64::from(n), deadline)
    }

    /// Subtract `n` and return the new value.
    pub fn decr(&self, location: &Location, n: i32, deadline: Deadline) -> StoreResult<i64> {
        let token = location.tokenize()?;
        self.engine.incr(&token, -i64::from(n), deadline)
    }
}
