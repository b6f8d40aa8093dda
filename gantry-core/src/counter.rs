//! Ordering keys
//!
//! Scheduled jobs are ordered by a counter seeded from the wall clock once and
//! incremented atomically afterwards, so keys keep increasing when the clock
//! stalls or steps back.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn current_time_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_time_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Thread-safe, strictly increasing counter
#[derive(Debug)]
pub struct TimeStampBasedCounter {
    last: AtomicI64,
}

impl TimeStampBasedCounter {
    pub fn new(clock: &dyn Clock) -> Self {
        Self {
            last: AtomicI64::new(clock.current_time_millis()),
        }
    }

    pub fn next(&self) -> i64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for TimeStampBasedCounter {
    fn default() -> Self {
        Self::new(&SystemClock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct FrozenClock(i64);

    impl Clock for FrozenClock {
        fn current_time_millis(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn test_next_increments_from_seed() {
        let counter = TimeStampBasedCounter::new(&FrozenClock(1000));
        assert_eq!(counter.next(), 1001);
        assert_eq!(counter.next(), 1002);
    }

    #[test]
    fn test_concurrent_callers_get_distinct_values() {
        let counter = Arc::new(TimeStampBasedCounter::new(&FrozenClock(0)));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || counter.next())
            })
            .collect();

        let values: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let distinct: HashSet<i64> = values.iter().copied().collect();

        assert_eq!(distinct.len(), 10);
        assert_eq!(distinct, (1..=10).collect());
    }

    #[test]
    fn test_seeded_from_system_clock() {
        let before = Utc::now().timestamp_millis();
        let counter = TimeStampBasedCounter::default();
        assert!(counter.next() > before);
    }
}
