//! Real monotonic time.

use std::time::{Duration, Instant};

use super::{Clock, Deadline};

/// A [`Clock`] backed by [`Instant`]; its epoch is the moment it was created.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Creates a clock whose epoch is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// The real instant corresponding to `deadline`, if representable.
    #[must_use]
    pub fn instant_of(&self, deadline: Deadline) -> Option<Instant> {
        if deadline.is_never() {
            return None;
        }
        self.epoch.checked_add(deadline.as_duration())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep_until(&self, deadline: Deadline) {
        let remaining = deadline.remaining(self.now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}
