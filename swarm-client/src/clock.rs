//! Wall-clock abstraction with absolute-deadline waits.
//!
//! All timing in the animation path is expressed as absolute Unix seconds so
//! that a long sequence never accumulates drift from relative sleeps.

use parking_lot::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time as Unix seconds.
    fn now(&self) -> f64;

    /// Block until `now() >= deadline`. Returns immediately for past deadlines.
    fn sleep_until(&self, deadline: f64);

    /// Time remaining until `deadline`, zero if it has passed.
    ///
    /// Saturates at `Duration::MAX` for deadlines too far out to represent.
    fn until(&self, deadline: f64) -> Duration {
        Duration::try_from_secs_f64((deadline - self.now()).max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// The host's system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn sleep_until(&self, deadline: f64) {
        // Re-check after each sleep: the OS may wake early
        loop {
            let remaining = self.until(deadline);
            if remaining.is_zero() {
                return;
            }
            std::thread::sleep(remaining);
        }
    }
}

/// Virtual clock that jumps forward instead of sleeping.
///
/// Used by tests and dry runs to check schedules exactly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move time forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }

    fn sleep_until(&self, deadline: f64) {
        let mut now = self.now.lock();
        if deadline > *now {
            *now = deadline;
        }
    }

    fn until(&self, _deadline: f64) -> Duration {
        Duration::ZERO
    }
}
