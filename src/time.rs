//! Wall-clock access for the poll cycle.
//!
//! Every series emitted in one cycle carries the same epoch. The reporter asks
//! its `Clock` once at the top of the cycle and threads that value through the
//! rest of the work.

use chrono::Utc;
use std::cmp;
use std::thread;
use std::time;

/// Source of wall-clock time, in milliseconds since the UNIX epoch.
pub trait Clock: Send + Sync {
    /// The current time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// The system clock, as reported by `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that never moves. Useful when a test needs to know the epoch in
/// advance.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

/// Convert a clock reading into the second-resolution epoch shared by a
/// cycle.
pub fn epoch_seconds(clock: &dyn Clock) -> i64 {
    clock.now_ms() / 1000
}

/// Sleep for at most `limit`, in slices no longer than 100ms, returning early
/// once `stop` reports true.
pub fn delay_until<F>(limit: time::Duration, stop: F)
where
    F: Fn() -> bool,
{
    let slice = time::Duration::from_millis(100);
    let start = time::Instant::now();
    loop {
        if stop() {
            return;
        }
        let elapsed = start.elapsed();
        if elapsed >= limit {
            return;
        }
        thread::sleep(cmp::min(slice, limit - elapsed));
    }
}
