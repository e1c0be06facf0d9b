//! Time sources for the scheduler
//!
//! Every tree reads time through a [`Clock`]. Times are [`Deadline`]s: an
//! offset from the clock's own epoch, so the same scheduling code runs against
//! real monotonic time ([`SystemClock`]) and virtual time ([`MockClock`]).
//!
//! # Example
//!
//! ```rust
//! use seqtree::clock::{Clock, Deadline, MockClock};
//! use std::time::Duration;
//!
//! let clock = MockClock::new();
//! assert_eq!(clock.now(), Duration::ZERO);
//!
//! clock.sleep_until(Deadline::from(Duration::from_secs(1)));
//! assert_eq!(clock.now(), Duration::ZERO); // manual clocks don't move on their own
//!
//! clock.advance(Duration::from_secs(10));
//! assert_eq!(clock.now(), Duration::from_secs(10));
//! ```

mod deadline;
mod mock_clock;
mod system;

use std::time::Duration;

pub use deadline::Deadline;
pub use mock_clock::MockClock;
pub use system::SystemClock;

/// A monotonic source of time for a sequence tree.
///
/// Implementations must never go backwards between two calls to
/// [`now`](Clock::now) on the same clock, and must be safe to read from any
/// thread: predicate-waits and cross-thread injection both read the clock.
pub trait Clock: Send + Sync + 'static {
    /// Time elapsed since the clock's epoch.
    fn now(&self) -> Duration;

    /// Blocks the calling thread until `deadline` (or returns immediately if
    /// it has passed). Virtual clocks may advance themselves instead.
    fn sleep_until(&self, deadline: Deadline);

    /// The current time as a [`Deadline`].
    fn deadline(&self) -> Deadline {
        Deadline::from(self.now())
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep_until(&self, deadline: Deadline) {
        (**self).sleep_until(deadline);
    }
}
