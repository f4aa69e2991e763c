//! Advisory lock manager.
//!
//! A lock is a time-bounded lease on a token, held in its own namespace so
//! a lock and a value may share a key. Acquiring returns a random release
//! token that must be presented to unlock. A lock whose deadline has passed
//! counts as released: it can be re-acquired and can no longer be unlocked.
//!
//! Locks are not enforced by the engine. Callers wrap their own critical
//! sections in `lock`/`unlock`.

use crate::core::error::{StoreError, StoreResult};
use crate::core::time::Deadline;
use crate::store::engine::{LockRecord, StorageEngine};
use crate::store::scope::Location;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Lock operations over the shared engine.
#[derive(Debug, Clone)]
pub struct LockManager {
    engine: Arc<StorageEngine>,
}

impl LockManager {
    /// Create a lock manager.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Acquire the lock for `timeout_seconds`; 0 uses the configured default.
    ///
    /// Returns the release token.
    pub fn lock(
        &self,
        location: &Location,
        timeout_seconds: i32,
        deadline: Deadline,
    ) -> StoreResult<String> {
        let token = location.tokenize()?;
        if timeout_seconds < 0 {
            return Err(StoreError::NegativeTtl {
                token: token.to_string(),
                ttl: i64::from(timeout_seconds),
            });
        }
        let hold = match timeout_seconds {
            0 => self.engine.config().default_lock_timeout(),
            secs => Duration::from_secs(secs as u64),
        };

        self.engine.write(&token, deadline, |table, now| {
            if let Some(existing) = table.lock(&token) {
                if !existing.is_elapsed_at(now) {
                    return Err(StoreError::AlreadyLocked {
                        token: token.to_string(),
                    });
                }
            }

            let release_token = Uuid::new_v4().to_string();
            table.insert_lock(
                &token,
                LockRecord {
                    release_token: release_token.clone(),
                    acquired_at: now,
                    deadline: now.add(hold),
                },
            );
            tracing::trace!(token = %token, hold_ms = hold.as_millis() as u64, "lock acquired");
            Ok(release_token)
        })
    }

    /// Release the lock held with `release_token`.
    pub fn unlock(
        &self,
        location: &Location,
        release_token: &str,
        deadline: Deadline,
    ) -> StoreResult<()> {
        let token = location.tokenize()?;
        self.engine.write(&token, deadline, |table, now| {
            let record = match table.lock(&token) {
                Some(record) if !record.is_elapsed_at(now) => record,
                _ => return Err(StoreError::item_not_found(token.as_str(), "lock")),
            };
            if record.release_token != release_token {
                return Err(StoreError::LockMismatch {
                    token: token.to_string(),
                });
            }
            table.remove_lock(&token);
            tracing::trace!(token = %token, "lock released");
            Ok(())
        })
    }
}
