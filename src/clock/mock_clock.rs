//! Virtual time for scheduling tests.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::{Clock, Deadline};

/// A clock that only moves when told to.
///
/// In manual mode (the default) the test moves time with
/// [`advance`](MockClock::advance) or [`advance_to`](MockClock::advance_to),
/// and a driver's [`sleep_until`](Clock::sleep_until) is only counted. In
/// auto-advance mode `sleep_until` jumps straight to the requested deadline,
/// so a whole driver loop replays its timeline instantly.
///
/// Clones share one timeline and may be used from any thread.
///
/// # Example
///
/// ```rust
/// use seqtree::clock::{Clock, Deadline, MockClock};
/// use std::time::Duration;
///
/// let clock = MockClock::auto_advancing();
/// clock.sleep_until(Deadline::from(Duration::from_millis(250)));
/// assert_eq!(clock.now(), Duration::from_millis(250));
///
/// let observer = clock.clone();
/// observer.advance(Duration::from_millis(50));
/// assert_eq!(clock.now(), Duration::from_millis(300));
/// assert_eq!(clock.sleep_count(), 1);
/// assert_eq!(clock.last_sleep(), Some(Deadline::from(Duration::from_millis(250))));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    timeline: Arc<Mutex<Timeline>>,
}

#[derive(Debug)]
struct Timeline {
    /// Virtual time since the clock's epoch
    elapsed: Duration,
    /// `sleep_until` moves `elapsed` forward
    auto_advance: bool,
    /// Number of `sleep_until` calls
    sleeps: usize,
    /// Deadline of the latest `sleep_until` call
    last_sleep: Option<Deadline>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Creates a manual clock at its epoch.
    #[must_use]
    pub fn new() -> Self {
        Self::with_start_time(Duration::ZERO)
    }

    /// Creates a manual clock already `start` past its epoch.
    ///
    /// ```rust
    /// use seqtree::clock::MockClock;
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::with_start_time(Duration::from_secs(90));
    /// assert_eq!(clock.now(), Duration::from_secs(90));
    /// assert!(!clock.is_auto_advancing());
    /// ```
    #[must_use]
    pub fn with_start_time(start: Duration) -> Self {
        Self {
            timeline: Arc::new(Mutex::new(Timeline {
                elapsed: start,
                auto_advance: false,
                sleeps: 0,
                last_sleep: None,
            })),
        }
    }

    /// Creates an auto-advancing clock at its epoch.
    #[must_use]
    pub fn auto_advancing() -> Self {
        let clock = Self::new();
        clock.set_auto_advance(true);
        clock
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.timeline.lock().elapsed
    }

    /// Moves time forward by `step`, saturating at `Duration::MAX`.
    pub fn advance(&self, step: Duration) {
        let mut timeline = self.timeline.lock();
        timeline.elapsed = timeline.elapsed.saturating_add(step);
    }

    /// Moves time forward to `target`. Never moves it back.
    ///
    /// ```rust
    /// use seqtree::clock::MockClock;
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::new();
    /// clock.advance_to(Duration::from_millis(700));
    /// clock.advance_to(Duration::from_millis(200));
    /// assert_eq!(clock.now(), Duration::from_millis(700));
    /// ```
    pub fn advance_to(&self, target: Duration) {
        let mut timeline = self.timeline.lock();
        timeline.elapsed = timeline.elapsed.max(target);
    }

    /// Switches auto-advance on or off.
    pub fn set_auto_advance(&self, enabled: bool) {
        self.timeline.lock().auto_advance = enabled;
    }

    /// Whether `sleep_until` moves time.
    #[must_use]
    pub fn is_auto_advancing(&self) -> bool {
        self.timeline.lock().auto_advance
    }

    /// Number of `sleep_until` calls so far.
    #[must_use]
    pub fn sleep_count(&self) -> usize {
        self.timeline.lock().sleeps
    }

    /// The deadline a driver most recently asked to sleep until.
    #[must_use]
    pub fn last_sleep(&self) -> Option<Deadline> {
        self.timeline.lock().last_sleep
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        MockClock::now(self)
    }

    fn sleep_until(&self, deadline: Deadline) {
        let mut timeline = self.timeline.lock();
        timeline.sleeps = timeline.sleeps.saturating_add(1);
        timeline.last_sleep = Some(deadline);
        if timeline.auto_advance && !deadline.is_never() {
            timeline.elapsed = timeline.elapsed.max(deadline.as_duration());
        }
    }
}
