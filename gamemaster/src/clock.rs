//! Time sources used by the engine: wall-clock for scheduling `at`
//! timestamps, monotonic for double-press interval measurement.
//!
//! Kept behind a trait, the way `backbone_lib::timer::Timer` keeps time
//! an explicit, injected quantity rather than an ambient OS call, so tests
//! can drive the engine deterministically instead of racing real sleeps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// A source of "now", in both wall-clock and monotonic form.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time, used to stamp actuator commands.
    fn wall_now(&self) -> DateTime<Local>;

    /// Current monotonic instant, used to measure press intervals.
    fn mono_now(&self) -> Instant;
}

/// Production clock backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn wall_now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn mono_now(&self) -> Instant {
        Instant::now()
    }
}

/// A controllable clock for tests. Starts at `Instant::now()` /
/// `Local::now()` and advances only when told to, so double-press and
/// scheduling-margin assertions don't depend on real wall-clock timing.
pub struct FakeClock {
    base_wall: DateTime<Local>,
    base_mono: Instant,
    offset_micros: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base_wall: Local::now(),
            base_mono: Instant::now(),
            offset_micros: AtomicU64::new(0),
        })
    }

    pub fn advance(&self, by: Duration) {
        self.offset_micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    fn offset(&self) -> Duration {
        Duration::from_micros(self.offset_micros.load(Ordering::SeqCst))
    }
}

impl Clock for FakeClock {
    fn wall_now(&self) -> DateTime<Local> {
        self.base_wall
            + chrono::Duration::from_std(self.offset()).expect("offset fits in chrono::Duration")
    }

    fn mono_now(&self) -> Instant {
        self.base_mono + self.offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_both_wall_and_mono() {
        let clock = FakeClock::new();
        let wall0 = clock.wall_now();
        let mono0 = clock.mono_now();
        clock.advance(Duration::from_secs(5));
        assert_eq!((clock.wall_now() - wall0).num_seconds(), 5);
        assert_eq!(clock.mono_now() - mono0, Duration::from_secs(5));
    }
}
