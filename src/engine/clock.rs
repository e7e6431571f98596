//! Timestamp source for write ordering.
//!
//! Timestamps are `max(previous + 1, wall_clock_nanos)`, so two writes in
//! the same nanosecond still receive distinct, increasing values. Replica
//! reconciliation compares these across nodes; wall-clock skew between
//! nodes can therefore invert versions between replicas. A hybrid logical
//! clock would close that gap and could be swapped in behind `next()`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock nanoseconds since the UNIX epoch.
pub fn wall_nanos() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX),
        // Clock before the epoch: pin to zero, monotonicity still holds.
        Err(_) => 0,
    }
}

/// Process-local monotonic timestamp counter.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints the next timestamp: strictly greater than every previous
    /// call, and at least the current wall clock.
    pub fn next(&self) -> i64 {
        let wall = wall_nanos();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let minted = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, minted, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return minted,
                Err(current) => prev = current,
            }
        }
    }
}
