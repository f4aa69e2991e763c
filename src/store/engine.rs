//! Storage engine.
//!
//! One table maps composite tokens to entries with an expiry timestamp, and a
//! second, independent namespace holds advisory locks. Both live behind a
//! single `parking_lot::RwLock`:
//!
//! - reads (`get`, `all`, `len`, `peek`, `index`) take the lock shared
//! - every mutation takes it exclusively
//!
//! Lock acquisition is bounded by the caller's [`Deadline`]; if the budget
//! runs out first the operation fails with [`StoreError::Timeout`] and the
//! table is not touched.
//!
//! Expiry is lazy. An expired entry reports [`StoreError::Expired`] and stays
//! in the table until it is deleted or the sweeper collects it.

use crate::core::config::StoreConfig;
use crate::core::error::{StoreError, StoreResult};
use crate::core::time::{Clock, Deadline, SystemClock, Timestamp};
use crate::store::scope::Token;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Entries
// ============================================================================

/// Structure stored under a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Plain value.
    Scalar,
    /// Field table.
    Map,
    /// Ordered item sequence.
    Queue,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Map => write!(f, "map"),
            Self::Queue => write!(f, "queue"),
        }
    }
}

/// Entry payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain value.
    Scalar(Bytes),
    /// Field name to value.
    Map(HashMap<String, Bytes>),
    /// Head at the front.
    Queue(VecDeque<Bytes>),
}

impl Payload {
    /// Kind of this payload.
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Scalar(_) => EntryKind::Scalar,
            Self::Map(_) => EntryKind::Map,
            Self::Queue(_) => EntryKind::Queue,
        }
    }
}

/// A stored entry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Stored structure.
    pub payload: Payload,
    /// Expiry; the entry is expired once `now > expires_at`.
    pub expires_at: Timestamp,
}

impl Entry {
    /// Create an entry expiring at `expires_at`.
    pub fn new(payload: Payload, expires_at: Timestamp) -> Self {
        Self {
            payload,
            expires_at,
        }
    }

    /// Check if the entry has expired at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now.is_after(self.expires_at)
    }

    /// Scalar value, or `WrongKind`.
    pub fn scalar(&self, token: &Token) -> StoreResult<&Bytes> {
        match &self.payload {
            Payload::Scalar(value) => Ok(value),
            other => Err(wrong_kind(token, EntryKind::Scalar, other.kind())),
        }
    }

    /// Mutable scalar value, or `WrongKind`.
    pub fn scalar_mut(&mut self, token: &Token) -> StoreResult<&mut Bytes> {
        match &mut self.payload {
            Payload::Scalar(value) => Ok(value),
            other => Err(wrong_kind(token, EntryKind::Scalar, other.kind())),
        }
    }

    /// Field table, or `WrongKind`.
    pub fn map(&self, token: &Token) -> StoreResult<&HashMap<String, Bytes>> {
        match &self.payload {
            Payload::Map(fields) => Ok(fields),
            other => Err(wrong_kind(token, EntryKind::Map, other.kind())),
        }
    }

    /// Mutable field table, or `WrongKind`.
    pub fn map_mut(&mut self, token: &Token) -> StoreResult<&mut HashMap<String, Bytes>> {
        match &mut self.payload {
            Payload::Map(fields) => Ok(fields),
            other => Err(wrong_kind(token, EntryKind::Map, other.kind())),
        }
    }

    /// Item sequence, or `WrongKind`.
    pub fn queue(&self, token: &Token) -> StoreResult<&VecDeque<Bytes>> {
        match &self.payload {
            Payload::Queue(items) => Ok(items),
            other => Err(wrong_kind(token, EntryKind::Queue, other.kind())),
        }
    }

    /// Mutable item sequence, or `WrongKind`.
    pub fn queue_mut(&mut self, token: &Token) -> StoreResult<&mut VecDeque<Bytes>> {
        match &mut self.payload {
            Payload::Queue(items) => Ok(items),
            other => Err(wrong_kind(token, EntryKind::Queue, other.kind())),
        }
    }
}

fn wrong_kind(token: &Token, expected: EntryKind, found: EntryKind) -> StoreError {
    StoreError::WrongKind {
        token: token.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// Add `delta` to a decimal integer value in place.
///
/// Values are the ASCII decimal form of an `i64`. A value that does not parse
/// is left untouched.
pub fn apply_delta(
    value: &mut Bytes,
    delta: i64,
    token: &Token,
    field: Option<&str>,
) -> StoreResult<i64> {
    let current = std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| StoreError::NotNumeric {
            token: token.to_string(),
            field: field.map(str::to_string),
        })?;

    let next = current
        .checked_add(delta)
        .ok_or_else(|| StoreError::Overflow {
            token: token.to_string(),
            field: field.map(str::to_string),
        })?;

    *value = Bytes::from(next.to_string());
    Ok(next)
}

/// Advisory lock record.
#[derive(Debug, Clone)]
pub struct LockRecord {
    /// Secret required to release the lock.
    pub release_token: String,
    /// When the lock was granted.
    pub acquired_at: Timestamp,
    /// When the lock lapses on its own.
    pub deadline: Timestamp,
}

impl LockRecord {
    /// Check if the lock has lapsed at `now`.
    pub fn is_elapsed_at(&self, now: Timestamp) -> bool {
        now.is_at_or_after(self.deadline)
    }
}

// ============================================================================
// Table
// ============================================================================

/// Entry and lock namespaces guarded together by the engine lock.
#[derive(Debug, Default)]
pub struct Table {
    entries: HashMap<String, Entry>,
    locks: HashMap<String, LockRecord>,
}

impl Table {
    /// Live entry for `token`: `NotFound` if absent, `Expired` if lapsed.
    pub fn entry(&self, token: &Token, now: Timestamp) -> StoreResult<&Entry> {
        match self.entries.get(token.as_str()) {
            None => Err(StoreError::key_not_found(token.as_str())),
            Some(entry) if entry.is_expired_at(now) => Err(StoreError::Expired {
                token: token.to_string(),
            }),
            Some(entry) => Ok(entry),
        }
    }

    /// Mutable live entry for `token`.
    pub fn entry_mut(&mut self, token: &Token, now: Timestamp) -> StoreResult<&mut Entry> {
        match self.entries.get_mut(token.as_str()) {
            None => Err(StoreError::key_not_found(token.as_str())),
            Some(entry) if entry.is_expired_at(now) => Err(StoreError::Expired {
                token: token.to_string(),
            }),
            Some(entry) => Ok(entry),
        }
    }

    /// Insert or replace the entry for `token`.
    pub fn insert(&mut self, token: &Token, entry: Entry) {
        self.entries.insert(token.as_str().to_string(), entry);
    }

    /// Remove the entry for `token`, returning whether one existed.
    pub fn remove(&mut self, token: &Token) -> bool {
        self.entries.remove(token.as_str()).is_some()
    }

    /// Lock record for `token`, live or not.
    pub fn lock(&self, token: &Token) -> Option<&LockRecord> {
        self.locks.get(token.as_str())
    }

    /// Insert or replace the lock record for `token`.
    pub fn insert_lock(&mut self, token: &Token, record: LockRecord) {
        self.locks.insert(token.as_str().to_string(), record);
    }

    /// Remove the lock record for `token`.
    pub fn remove_lock(&mut self, token: &Token) -> Option<LockRecord> {
        self.locks.remove(token.as_str())
    }

    /// Number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lock records, including lapsed ones not yet swept.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

// ============================================================================
// Sweep support
// ============================================================================

/// Tokens observed as expired during a sweep scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExpiredSet {
    /// Expired entry tokens.
    pub entries: Vec<String>,
    /// Lapsed lock tokens.
    pub locks: Vec<String>,
}

impl ExpiredSet {
    /// Check if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.locks.is_empty()
    }
}

/// Result of the removal phase of a sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Entries removed.
    pub entries_removed: usize,
    /// Lock records removed.
    pub locks_removed: usize,
}

/// Engine counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Sweep cycles completed.
    pub sweeps: AtomicU64,
    /// Entries removed by the sweeper.
    pub swept_entries: AtomicU64,
    /// Lock records removed by the sweeper.
    pub swept_locks: AtomicU64,
    /// Operations that gave up waiting for the table lock.
    pub lock_timeouts: AtomicU64,
}

impl EngineStats {
    fn record_sweep(&self, outcome: SweepOutcome) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.swept_entries
            .fetch_add(outcome.entries_removed as u64, Ordering::Relaxed);
        self.swept_locks
            .fetch_add(outcome.locks_removed as u64, Ordering::Relaxed);
    }

    fn record_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The storage engine shared by every adapter, the RPC service and the sweeper.
#[derive(Debug)]
pub struct StorageEngine {
    table: RwLock<Table>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    stats: EngineStats,
}

impl StorageEngine {
    /// Create an engine using `clock` for expiry.
    pub fn new(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: RwLock::new(Table::default()),
            config,
            clock,
            stats: EngineStats::default(),
        }
    }

    /// Create an engine on the wall clock.
    pub fn with_system_clock(config: StoreConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current time according to the engine clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Counters.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Resolve a requested TTL: negative is rejected, 0 means the scope default.
    pub fn resolve_ttl(&self, token: &Token, ttl_seconds: i32) -> StoreResult<Duration> {
        if ttl_seconds < 0 {
            return Err(StoreError::NegativeTtl {
                token: token.to_string(),
                ttl: i64::from(ttl_seconds),
            });
        }
        if ttl_seconds == 0 {
            return Ok(self.config.default_ttl(token.kind()));
        }
        Ok(Duration::from_secs(ttl_seconds as u64))
    }

    /// Run `op` under the shared lock.
    pub fn read<R>(
        &self,
        token: &Token,
        deadline: Deadline,
        op: impl FnOnce(&Table, Timestamp) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let guard = self
            .table
            .try_read_for(deadline.remaining())
            .ok_or_else(|| self.timeout(token, deadline))?;
        op(&guard, self.clock.now())
    }

    /// Run `op` under the exclusive lock.
    pub fn write<R>(
        &self,
        token: &Token,
        deadline: Deadline,
        op: impl FnOnce(&mut Table, Timestamp) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut guard = self
            .table
            .try_write_for(deadline.remaining())
            .ok_or_else(|| self.timeout(token, deadline))?;
        op(&mut guard, self.clock.now())
    }

    fn timeout(&self, token: &Token, deadline: Deadline) -> StoreError {
        self.stats.record_timeout();
        tracing::debug!(token = %token, budget_ms = deadline.budget_ms(), "table lock wait timed out");
        StoreError::Timeout {
            token: token.to_string(),
            waited_ms: deadline.budget_ms(),
        }
    }

    /// Write or overwrite `payload` under `token`.
    pub fn put(
        &self,
        token: &Token,
        payload: Payload,
        ttl_seconds: i32,
        deadline: Deadline,
    ) -> StoreResult<()> {
        let ttl = self.resolve_ttl(token, ttl_seconds)?;
        self.write(token, deadline, |table, now| {
            table.insert(token, Entry::new(payload, now.add(ttl)));
            Ok(())
        })
    }

    /// Write a scalar value.
    pub fn set(
        &self,
        token: &Token,
        value: Bytes,
        ttl_seconds: i32,
        deadline: Deadline,
    ) -> StoreResult<()> {
        self.put(token, Payload::Scalar(value), ttl_seconds, deadline)
    }

    /// Read a scalar value.
    pub fn get(&self, token: &Token, deadline: Deadline) -> StoreResult<Bytes> {
        self.read(token, deadline, |table, now| {
            table.entry(token, now)?.scalar(token).cloned()
        })
    }

    /// Remove any entry under `token`. Absence is not an error.
    pub fn del(&self, token: &Token, deadline: Deadline) -> StoreResult<bool> {
        self.write(token, deadline, |table, _| Ok(table.remove(token)))
    }

    /// Add `delta` to a scalar integer; the TTL is left as it was.
    pub fn incr(&self, token: &Token, delta: i64, deadline: Deadline) -> StoreResult<i64> {
        self.write(token, deadline, |table, now| {
            let value = table.entry_mut(token, now)?.scalar_mut(token)?;
            apply_delta(value, delta, token, None)
        })
    }

    /// Number of entries currently held, including unswept expired ones.
    pub fn entry_count(&self) -> usize {
        self.table.read().len()
    }

    /// Number of lock records currently held, including unswept lapsed ones.
    pub fn lock_count(&self) -> usize {
        self.table.read().lock_count()
    }

    /// Sweep phase 1: scan under the shared lock and collect expired tokens.
    pub fn collect_expired(&self) -> ExpiredSet {
        let now = self.clock.now();
        let table = self.table.read();
        ExpiredSet {
            entries: table
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now))
                .map(|(token, _)| token.clone())
                .collect(),
            locks: table
                .locks
                .iter()
                .filter(|(_, lock)| lock.is_elapsed_at(now))
                .map(|(token, _)| token.clone())
                .collect(),
        }
    }

    /// Sweep phase 2: under the exclusive lock, remove each collected token
    /// that still exists and is still expired.
    pub fn remove_expired(&self, expired: &ExpiredSet) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        if expired.is_empty() {
            self.stats.record_sweep(outcome);
            return outcome;
        }

        let mut table = self.table.write();
        let now = self.clock.now();
        for token in &expired.entries {
            let lapsed = table
                .entries
                .get(token)
                .is_some_and(|entry| entry.is_expired_at(now));
            if lapsed {
                table.entries.remove(token);
                outcome.entries_removed += 1;
            }
        }
        for token in &expired.locks {
            let lapsed = table
                .locks
                .get(token)
                .is_some_and(|lock| lock.is_elapsed_at(now));
            if lapsed {
                table.locks.remove(token);
                outcome.locks_removed += 1;
            }
        }
        drop(table);

        self.stats.record_sweep(outcome);
        outcome
    }
}
