//! Time sources and request deadlines.
//!
//! Expiry is evaluated against a [`Clock`]. Production code uses the wall
//! clock ([`SystemClock`]); tests drive a [`ManualClock`] so TTL behavior can
//! be checked without sleeping.
//!
//! [`Deadline`] is the per-request budget for acquiring the table lock. It
//! is always measured on the monotonic clock, independent of the expiry
//! clock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A point in time used for expiry, in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Milliseconds since the epoch.
    pub ms: u64,
}

impl Timestamp {
    /// Create a new timestamp with the given millisecond value.
    pub const fn new(ms: u64) -> Self {
        Self { ms }
    }

    /// Add a duration, saturating at `u64::MAX`.
    pub fn add(self, duration: Duration) -> Self {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self {
            ms: self.ms.saturating_add(ms),
        }
    }

    /// Check if this timestamp is strictly after `other`.
    pub const fn is_after(self, other: Timestamp) -> bool {
        self.ms > other.ms
    }

    /// Check if this timestamp is at or after `deadline`.
    pub const fn is_at_or_after(self, deadline: Timestamp) -> bool {
        self.ms >= deadline.ms
    }

    /// Milliseconds until `deadline`, 0 if it already passed.
    pub fn ms_until(self, deadline: Timestamp) -> u64 {
        deadline.ms.saturating_sub(self.ms)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.ms)
    }
}

// ============================================================================
// Clocks
// ============================================================================

/// Source of the current time for expiry decisions.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Timestamp::new(ms)
    }
}

/// Manually driven time source.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock starting at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::AcqRel);
    }

    /// Set the clock to an absolute value.
    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.now_ms.load(Ordering::Acquire))
    }
}

// ============================================================================
// Deadlines
// ============================================================================

/// Caller-supplied budget for one operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: std::time::Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: std::time::Instant::now() + budget,
            budget,
        }
    }

    /// A deadline built from a millisecond budget.
    pub fn after_ms(ms: u64) -> Self {
        Self::after(Duration::from_millis(ms))
    }

    /// Time left before the deadline, zero once elapsed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(std::time::Instant::now())
    }

    /// Check if the deadline already passed.
    pub fn is_elapsed(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Full budget in milliseconds.
    pub fn budget_ms(&self) -> u64 {
        self.budget.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let t = Timestamp::new(1_000);
        let later = t.add(Duration::from_secs(1));
        assert_eq!(later.ms, 2_000);
        assert!(later.is_after(t));
        assert!(!t.is_after(t));
        assert!(t.is_at_or_after(t));
        assert_eq!(t.ms_until(later), 1_000);
        assert_eq!(later.ms_until(t), 0);
    }

    #[test]
    fn test_timestamp_add_saturates() {
        let t = Timestamp::new(u64::MAX - 1);
        assert_eq!(t.add(Duration::from_secs(10)).ms, u64::MAX);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(500);
        assert_eq!(clock.now(), Timestamp::new(500));
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now().ms, 750);
        clock.set(10);
        assert_eq!(clock.now().ms, 10);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b.ms >= a.ms);
        assert!(a.ms > 0);
    }

    #[test]
    fn test_deadline() {
        let d = Deadline::after_ms(60_000);
        assert!(!d.is_elapsed());
        assert!(d.remaining() <= Duration::from_secs(60));
        assert_eq!(d.budget_ms(), 60_000);

        let gone = Deadline::after(Duration::ZERO);
        assert!(gone.is_elapsed());
        assert_eq!(gone.remaining(), Duration::ZERO);
    }
}
