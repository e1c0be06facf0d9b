//! Absolute wake times.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// An absolute point in a [`Clock`](super::Clock)'s time, or "never".
///
/// Deadlines are totally ordered, so the scheduler folds them with `min`.
/// [`Deadline::IMMEDIATE`] sits at the epoch and is due on every tick;
/// [`Deadline::NEVER`] is later than any reachable time.
///
/// # Example
///
/// ```rust
/// use seqtree::clock::Deadline;
/// use std::time::Duration;
///
/// let now = Duration::from_secs(5);
/// assert_eq!(Deadline::after(now, Duration::ZERO), Deadline::IMMEDIATE);
/// assert_eq!(
///     Deadline::after(now, Duration::from_secs(1)),
///     Deadline::from(Duration::from_secs(6))
/// );
/// assert!(Deadline::NEVER > Deadline::from(Duration::from_secs(u64::MAX / 2)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Deadline(Duration);

impl Deadline {
    /// Always due.
    pub const IMMEDIATE: Self = Self(Duration::ZERO);

    /// Never due.
    pub const NEVER: Self = Self(Duration::MAX);

    /// The deadline `delay` after `now`. A zero delay means "immediately due",
    /// not "due at `now`"; the two only differ for clocks read later.
    #[must_use]
    pub fn after(now: Duration, delay: Duration) -> Self {
        if delay.is_zero() {
            Self::IMMEDIATE
        } else {
            Self(now.saturating_add(delay))
        }
    }

    /// Offset from the clock's epoch.
    #[must_use]
    pub fn as_duration(self) -> Duration {
        self.0
    }

    /// Returns `true` if this deadline has been reached at `now`.
    #[must_use]
    pub fn is_due(self, now: Duration) -> bool {
        self.0 <= now
    }

    /// Returns `true` for [`Deadline::NEVER`].
    #[must_use]
    pub fn is_never(self) -> bool {
        self == Self::NEVER
    }

    /// Time left until this deadline, zero if it has passed.
    #[must_use]
    pub fn remaining(self, now: Duration) -> Duration {
        self.0.saturating_sub(now)
    }
}

impl From<Duration> for Deadline {
    fn from(at: Duration) -> Self {
        Self(at)
    }
}

impl Add<Duration> for Deadline {
    type Output = Deadline;

    fn add(self, rhs: Duration) -> Deadline {
        Deadline(self.0.saturating_add(rhs))
    }
}

impl Sub<Duration> for Deadline {
    type Output = Deadline;

    fn sub(self, rhs: Duration) -> Deadline {
        Deadline(self.0.saturating_sub(rhs))
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            write!(f, "never")
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let a = Deadline::from(Duration::from_millis(10));
        let b = Deadline::from(Duration::from_millis(20));
        assert!(Deadline::IMMEDIATE < a);
        assert!(a < b);
        assert!(b < Deadline::NEVER);
        assert_eq!(a.min(b), a);
    }

    #[test]
    fn test_after_saturates() {
        let d = Deadline::after(Duration::from_secs(1), Duration::MAX);
        assert!(d.is_never());
        assert_eq!(Deadline::NEVER + Duration::from_secs(1), Deadline::NEVER);
    }

    #[test]
    fn test_is_due() {
        let now = Duration::from_millis(100);
        assert!(Deadline::IMMEDIATE.is_due(now));
        assert!(Deadline::from(now).is_due(now));
        assert!(!Deadline::from(now + Duration::from_nanos(1)).is_due(now));
        assert!(!Deadline::NEVER.is_due(now));
    }

    #[test]
    fn test_remaining() {
        let d = Deadline::from(Duration::from_millis(150));
        assert_eq!(d.remaining(Duration::from_millis(100)), Duration::from_millis(50));
        assert_eq!(d.remaining(Duration::from_millis(200)), Duration::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Deadline::NEVER.to_string(), "never");
        assert_eq!(Deadline::from(Duration::from_millis(5)).to_string(), "5ms");
    }
}
