//! Clock abstraction for testable time
//!
//! Journal timestamps come from a `Clock` so that the liveness sweep and the
//! handshake feed can be driven deterministically in tests.

use crate::event::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of journal timestamps.
pub trait Clock: Send + Sync {
    /// Current time on the journal clock.
    fn now(&self) -> Timestamp;
}

/// Wall clock, nanoseconds since the Unix epoch.
///
/// Wall time survives restarts, so keys written by one run still order
/// correctly against the next run's keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::from_duration(since_epoch)
    }
}

/// Manually driven clock for tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    nanos: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(start.as_nanos())),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.nanos.store(time.as_nanos(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_counts_epoch_nanos() {
        let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        let now = SystemClock.now();
        let after = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        assert!(now >= Timestamp::from_duration(before));
        assert!(now <= Timestamp::from_duration(after));
        // Nanosecond resolution, not seconds or millis
        assert!(now.as_nanos() > 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_mock_clock_shared_between_clones() {
        let clock = MockClock::new(Timestamp::from_secs(10));
        let other = clock.clone();
        clock.advance(Duration::from_secs(5));
        assert_eq!(other.now(), Timestamp::from_secs(15));
        other.set(Timestamp::from_secs(1));
        assert_eq!(clock.now(), Timestamp::from_secs(1));
    }
}
