//! Driver configuration.

use std::fmt;
use std::time::Duration;

/// What a failing task body does to the `dispatch()` call that resumed it.
///
/// Either way the failing sequence and its subtree are torn down and the
/// failure is delivered through its result channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// `dispatch()` returns the failure.
    #[default]
    Propagate,
    /// The failure is logged and dispatching carries on.
    Contain,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Propagate => write!(f, "Propagate"),
            FailurePolicy::Contain => write!(f, "Contain"),
        }
    }
}

/// Configuration for a [`Driver`](super::Driver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Longest single sleep of the driver loop, however far off the next
    /// wake time is.
    pub max_sleep: Duration,
    /// Failure handling for the whole tree.
    pub failure_policy: FailurePolicy,
    /// Cap on driver loop iterations.
    pub max_ticks: Option<usize>,
    /// Name of the root node.
    pub root_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_sleep: Duration::from_secs(3),
            failure_policy: FailurePolicy::default(),
            max_ticks: None,
            root_name: "root".to_string(),
        }
    }
}

impl DriverConfig {
    /// Create a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sleep cap.
    #[must_use]
    pub fn max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Set the failure policy.
    #[must_use]
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Stop the driver loop with [`Error::TickLimit`](crate::Error::TickLimit)
    /// after `ticks` dispatches.
    #[must_use]
    pub fn max_ticks(mut self, ticks: usize) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Set the root node's name.
    #[must_use]
    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_config_default() {
        let config = DriverConfig::default();

        assert_eq!(config.max_sleep, Duration::from_secs(3));
        assert_eq!(config.failure_policy, FailurePolicy::Propagate);
        assert_eq!(config.max_ticks, None);
        assert_eq!(config.root_name, "root");
    }

    #[test]
    fn test_driver_config_builder() {
        let config = DriverConfig::new()
            .max_sleep(Duration::from_millis(100))
            .failure_policy(FailurePolicy::Contain)
            .max_ticks(50)
            .root_name("main");

        assert_eq!(config.max_sleep, Duration::from_millis(100));
        assert_eq!(config.failure_policy, FailurePolicy::Contain);
        assert_eq!(config.max_ticks, Some(50));
        assert_eq!(config.root_name, "main");
    }

    #[test]
    fn test_failure_policy_display() {
        assert_eq!(FailurePolicy::Propagate.to_string(), "Propagate");
        assert_eq!(FailurePolicy::Contain.to_string(), "Contain");
    }
}
