//! Time primitives.
//!
//! LamportClock: the ordering primitive. Strictly monotonic per process.
//! WallClock: millisecond wall time for TTL decisions, never for ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic Lamport clock.
///
/// Each `next()` returns a value strictly greater than every value this
/// process has handed out before: `max(previous, wall-clock-ns) + 1`.
/// Seeding from wall-clock nanoseconds keeps values from distinct
/// processes roughly aligned without any coordination.
#[derive(Debug, Default)]
pub struct LamportClock {
    last: AtomicU64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock that will never go below `floor`. Used when reopening a
    /// repository whose logs already contain high lamport values.
    pub fn starting_at(floor: u64) -> Self {
        Self {
            last: AtomicU64::new(floor),
        }
    }

    pub fn next(&self) -> u64 {
        let now = wall_clock_nanos();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = prev.max(now) + 1;
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => prev = observed,
            }
        }
    }

    /// Fold an externally observed lamport into the clock so later local
    /// ops order after everything this process has seen.
    pub fn observe(&self, seen: u64) {
        self.last.fetch_max(seen, Ordering::AcqRel);
    }
}

fn wall_clock_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Wall clock in milliseconds since the Unix epoch.
///
/// Copy is fine here: it is a measurement, not causality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct WallClock(pub u64);

impl WallClock {
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn saturating_age_ms(&self, now: WallClock) -> u64 {
        now.0.saturating_sub(self.0)
    }
}
