//! Contains time related utilities.

use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Trait that provides current time as nanos since a fixed origin. Handshake, write and close
/// timeouts are measured against it so they can be driven by a fake clock in tests. Sources must
/// never go backwards.
pub trait TimeSource: Debug + Send + Sync {
    /// Provides current time as nanos since the source's origin.
    fn current_time_nanos(&self) -> u64;
}

/// Uses `Instant` as [`TimeSource`], so wall clock adjustments (NTP, RTC sync) do not move
/// deadlines. Time is counted from the moment the source was created.
#[derive(Debug, Copy, Clone)]
pub struct MonotonicClockSource {
    origin: Instant,
}

impl Default for MonotonicClockSource {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl TimeSource for MonotonicClockSource {
    #[inline]
    fn current_time_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Point in time after which an operation is considered timed out.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Deadline {
    expires_at_ns: u64,
}

impl Deadline {
    pub fn after(time_source: &dyn TimeSource, timeout: Duration) -> Deadline {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        Self {
            expires_at_ns: time_source.current_time_nanos().saturating_add(timeout_ns),
        }
    }

    #[inline]
    pub fn expired(&self, time_source: &dyn TimeSource) -> bool {
        time_source.current_time_nanos() >= self.expires_at_ns
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock that only moves when told to.
    #[derive(Debug, Default, Clone)]
    pub struct ManualClock {
        now_ns: Arc<AtomicU64>,
    }

    impl ManualClock {
        pub fn advance(&self, by: Duration) {
            self.now_ns.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
        }
    }

    impl TimeSource for ManualClock {
        fn current_time_nanos(&self) -> u64 {
            self.now_ns.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn should_expire_deadline() {
        let clock = ManualClock::default();
        let deadline = Deadline::after(&clock, Duration::from_millis(100));
        assert!(!deadline.expired(&clock));
        clock.advance(Duration::from_millis(99));
        assert!(!deadline.expired(&clock));
        clock.advance(Duration::from_millis(1));
        assert!(deadline.expired(&clock));
    }

    #[test]
    fn should_advance_monotonic_clock() {
        let clock = MonotonicClockSource::default();
        let first = clock.current_time_nanos();
        std::thread::sleep(Duration::from_millis(2));
        let second = clock.current_time_nanos();
        assert!(second >= first + 2_000_000);
    }

    #[test]
    fn should_not_overflow_on_huge_timeout() {
        let clock = ManualClock::default();
        clock.advance(Duration::from_secs(1));
        let deadline = Deadline::after(&clock, Duration::MAX);
        assert!(!deadline.expired(&clock));
    }
}
