//! Queue adapter: an ordered item sequence inside one container entry.
//!
//! Items are pushed at the tail and popped from the head. The queue must be
//! created with [`QueueStore::create`] first. Pop and peek on an empty queue
//! report `NotFound`; an index outside `0..len` reports `IndexOutOfRange`.

use crate::core::error::{StoreError, StoreResult};
use crate::core::time::Deadline;
use crate::store::engine::{Payload, StorageEngine};
use crate::store::scope::{Location, Token};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;

/// Queue operations over the shared engine.
#[derive(Debug, Clone)]
pub struct QueueStore {
    engine: Arc<StorageEngine>,
}

fn empty_queue(token: &Token) -> StoreError {
    StoreError::item_not_found(token.as_str(), "head item")
}

impl QueueStore {
    /// Create a queue adapter.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Create (or reset) an empty queue; `ttl_seconds == 0` uses the scope default.
    pub fn create(
        &self,
        location: &Location,
        ttl_seconds: i32,
        deadline: Deadline,
    ) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine
            .put(&token, Payload::Queue(VecDeque::new()), ttl_seconds, deadline)
    }

    /// Remove the whole queue; absence is not an error.
    pub fn del(&self, location: &Location, deadline: Deadline) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine.del(&token, deadline).map(|_| ())
    }

    /// Append an item at the tail.
    pub fn push(&self, location: &Location, value: Bytes, deadline: Deadline) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine.write(&token, deadline, |table, now| {
            table.entry_mut(&token, now)?.queue_mut(&token)?.push_back(value);
            Ok(())
        })
    }

    /// Remove and return the head item.
    pub fn pop(&self, location: &Location, deadline: Deadline) -> StoreResult<Bytes> {
        let token = location.tokenize()?;
        self.engine.write(&token, deadline, |table, now| {
            table
                .entry_mut(&token, now)?
                .queue_mut(&token)?
                .pop_front()
                .ok_or_else(|| empty_queue(&token))
        })
    }

    /// Return the head item without removing it.
    pub fn peek(&self, location: &Location, deadline: Deadline) -> StoreResult<Bytes> {
        let token = location.tokenize()?;
        self.engine.read(&token, deadline, |table, now| {
            table
                .entry(&token, now)?
                .queue(&token)?
                .front()
                .cloned()
                .ok_or_else(|| empty_queue(&token))
        })
    }

    /// Return the item at `index`, counted from the head.
    pub fn index(&self, location: &Location, index: i32, deadline: Deadline) -> StoreResult<Bytes> {
        let token = location.tokenize()?;
        self.engine.read(&token, deadline, |table, now| {
            let items = table.entry(&token, now)?.queue(&token)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| StoreError::IndexOutOfRange {
                    token: token.to_string(),
                    index: i64::from(index),
                    len: items.len(),
                })
        })
    }

    /// Snapshot of every item, head first.
    pub fn all(&self, location: &Location, deadline: Deadline) -> StoreResult<Vec<Bytes>> {
        let token = location.tokenize()?;
        self.engine.read(&token, deadline, |table, now| {
            Ok(table.entry(&token, now)?.queue(&token)?.iter().cloned().collect())
        })
    }

    /// Number of items.
    pub fn len(&self, location: &Location, deadline: Deadline) -> StoreResult<usize> {
        let token = location.tokenize()?;
        self.engine.read(&token, deadline, |table, now| {
            Ok(table.entry(&token, now)?.queue(&token)?.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StoreConfig;
    use crate::store::scope::ScopeLocator;

    fn store() -> QueueStore {
        QueueStore::new(Arc::new(StorageEngine::with_system_clock(
            StoreConfig::default(),
        )))
    }

    fn d() -> Deadline {
        Deadline::after_ms(1_000)
    }

    fn loc() -> Location {
        Location::new(ScopeLocator::instance("b", "i"), "q")
    }

    #[test]
    fn test_fifo_order() {
        let queues = store();
        let q = loc();
        queues.create(&q, 0, d()).unwrap();
        queues.push(&q, Bytes::from("a"), d()).unwrap();
        queues.push(&q, Bytes::from("b"), d()).unwrap();

        assert_eq!(queues.pop(&q, d()).unwrap(), Bytes::from("a"));
        assert_eq!(queues.pop(&q, d()).unwrap(), Bytes::from("b"));
        let err = queues.pop(&q, d()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(err.to_string().contains("instance.b.i.q"));
    }

    #[test]
    fn test_push_requires_container() {
        let queues = store();
        assert_eq!(
            queues.push(&loc(), Bytes::from("a"), d()).unwrap_err(),
            StoreError::key_not_found("instance.b.i.q")
        );
    }

    #[test]
    fn test_peek_index_len_all() {
        let queues = store();
        let q = loc();
        queues.create(&q, 0, d()).unwrap();
        assert!(matches!(
            queues.peek(&q, d()),
            Err(StoreError::NotFound { .. })
        ));

        for item in ["x", "y", "z"] {
            queues.push(&q, Bytes::from(item), d()).unwrap();
        }
        assert_eq!(queues.peek(&q, d()).unwrap(), Bytes::from("x"));
        assert_eq!(queues.len(&q, d()).unwrap(), 3);
        assert_eq!(queues.index(&q, 2, d()).unwrap(), Bytes::from("z"));

        assert_eq!(
            queues.index(&q, 3, d()).unwrap_err(),
            StoreError::IndexOutOfRange {
                token: "instance.b.i.q".into(),
                index: 3,
                len: 3,
            }
        );
        assert!(matches!(
            queues.index(&q, -1, d()),
            Err(StoreError::IndexOutOfRange { index: -1, .. })
        ));

        let snapshot = queues.all(&q, d()).unwrap();
        queues.pop(&q, d()).unwrap();
        assert_eq!(
            snapshot,
            vec![Bytes::from("x"), Bytes::from("y"), Bytes::from("z")]
        );
        assert_eq!(queues.len(&q, d()).unwrap(), 2);
    }

    #[test]
    fn test_queue_and_scalar_share_key_space() {
        let engine = Arc::new(StorageEngine::with_system_clock(StoreConfig::default()));
        let queues = QueueStore::new(engine.clone());
        let q = loc();
        queues.create(&q, 0, d()).unwrap();

        let token = q.tokenize().unwrap();
        assert!(matches!(
            engine.get(&token, d()),
            Err(StoreError::WrongKind { .. })
        ));
    }
}
