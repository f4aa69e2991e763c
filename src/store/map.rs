//! Map adapter: named fields inside one container entry.
//!
//! A map must be created with [`MapStore::new`] before any field operation;
//! field operations on a missing container fail with `NotFound` and never
//! create it. Field writes keep the container's TTL.

use crate::core::error::{StoreError, StoreResult};
use crate::core::time::Deadline;
use crate::store::engine::{apply_delta, Payload, StorageEngine};
use crate::store::scope::{Location, Token};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Map operations over the shared engine.
#[derive(Debug, Clone)]
pub struct MapStore {
    engine: Arc<StorageEngine>,
}

fn field_item(field: &str) -> String {
    format!("field {:?}", field)
}

fn missing_field(token: &Token, field: &str) -> StoreError {
    StoreError::item_not_found(token.as_str(), field_item(field))
}

impl MapStore {
    /// Create a map adapter.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Create (or reset) an empty map; `ttl_seconds == 0` uses the scope default.
    pub fn create(
        &self,
        location: &Location,
        ttl_seconds: i32,
        deadline: Deadline,
    ) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine
            .put(&token, Payload::Map(HashMap::new()), ttl_seconds, deadline)
    }

    /// Remove the whole map; absence is not an error.
    pub fn del(&self, location: &Location, deadline: Deadline) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine.del(&token, deadline).map(|_| ())
    }

    /// Set one field.
    pub fn field_set(
        &self,
        location: &Location,
        field: &str,
        value: Bytes,
        deadline: Deadline,
    ) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine.write(&token, deadline, |table, now| {
            let fields = table.entry_mut(&token, now)?.map_mut(&token)?;
            fields.insert(field.to_string(), value);
            Ok(())
        })
    }

    /// Read one field.
    pub fn field_get(
        &self,
        location: &Location,
        field: &str,
        deadline: Deadline,
    ) -> StoreResult<Bytes> {
        let token = location.tokenize()?;
        self.engine.read(&token, deadline, |table, now| {
            table
                .entry(&token, now)?
                .map(&token)?
                .get(field)
                .cloned()
                .ok_or_else(|| missing_field(&token, field))
        })
    }

    /// Remove one field; a missing field is `NotFound`.
    pub fn field_del(
        &self,
        location: &Location,
        field: &str,
        deadline: Deadline,
    ) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine.write(&token, deadline, |table, now| {
            table
                .entry_mut(&token, now)?
                .map_mut(&token)?
                .remove(field)
                .map(|_| ())
                .ok_or_else(|| missing_field(&token, field))
        })
    }

    /// Add `n` to an integer field and return the new value.
    pub fn field_incr(
        &self,
        location: &Location,
        field: &str,
        n: i32,
        deadline: Deadline,
    ) -> StoreResult<i64> {
        self.field_delta(location, field, i64::from(n), deadline)
    }

    /// Subtract `n` from an integer field and return the new value.
    pub fn field_decr(
        &self,
        location: &Location,
        field: &str,
        n: i32,
        deadline: Deadline,
    ) -> StoreResult<i64> {
        self.field_delta(location, field, -i64::from(n), deadline)
    }

    fn field_delta(
        &self,
        location: &Location,
        field: &str,
        delta: i64,
        deadline: Deadline,
    ) -> StoreResult<i64> {
        let token = location.tokenize()?;
        self.engine.write(&token, deadline, |table, now| {
            let value = table
                .entry_mut(&token, now)?
                .map_mut(&token)?
                .get_mut(field)
                .ok_or_else(|| missing_field(&token, field))?;
            apply_delta(value, delta, &token, Some(field))
        })
    }

    /// Snapshot of every field, ordered by name.
    pub fn all(
        &self,
        location: &Location,
        deadline: Deadline,
    ) -> StoreResult<BTreeMap<String, Bytes>> {
        let token = location.tokenize()?;
        self.engine.read(&token, deadline, |table, now| {
            let fields = table.entry(&token, now)?.map(&token)?;
            Ok(fields
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect())
        })
    }

    /// Number of fields.
    pub fn len(&self, location: &Location, deadline: Deadline) -> StoreResult<usize> {
        let token = location.tokenize()?;
        self.engine.read(&token, deadline, |table, now| {
            Ok(table.entry(&token, now)?.map(&token)?.len())
        })
    }
}
