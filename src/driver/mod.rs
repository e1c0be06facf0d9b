//! The embedding side of a sequence tree.
//!
//! A [`Driver`] owns the root node and a [`Clock`]. The outside world
//! advances the tree only through [`Driver::dispatch`], usually from the
//! driver loop in [`run_until_done`](Driver::run_until_done): dispatch, stop
//! when the tree is done, otherwise sleep until the returned wake time
//! (capped by [`DriverConfig::max_sleep`]) and go again.
//!
//! # Example
//!
//! ```rust
//! use seqtree::clock::MockClock;
//! use seqtree::{Driver, DriverConfig, Error};
//! use std::time::Duration;
//!
//! let clock = MockClock::auto_advancing();
//! let driver = Driver::with_clock(clock.clone(), DriverConfig::default());
//!
//! let answer = driver.spawn("slow", |seq| async move {
//!     seq.wait_for(Duration::from_secs(10)).await;
//!     Ok::<_, Error>(42)
//! });
//!
//! driver.run_until_done().unwrap();
//! assert_eq!(answer.read().unwrap(), 42);
//! assert_eq!(clock.now(), Duration::from_secs(10));
//! ```

mod config;
#[cfg(feature = "tokio")]
mod tokio;

pub use config::{DriverConfig, FailurePolicy};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::channel::ResultReceiver;
use crate::clock::{Clock, Deadline, SystemClock};
use crate::error::{BoxError, Error, Result};
use crate::sequence::{Node, Sequence, Tree};

/// Owner of a sequence tree.
///
/// The thread that creates the driver becomes the tree's owner thread: only
/// it may dispatch.
pub struct Driver {
    root: Sequence,
    clock: Arc<dyn Clock>,
    config: DriverConfig,
}

impl Driver {
    /// Creates a driver on the system clock with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DriverConfig::default())
    }

    /// Creates a driver on the system clock.
    #[must_use]
    pub fn with_config(config: DriverConfig) -> Self {
        Self::with_clock(SystemClock::new(), config)
    }

    /// Creates a driver on any clock.
    #[must_use]
    pub fn with_clock<C: Clock>(clock: C, config: DriverConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let tree = Tree::new(Arc::clone(&clock), config.failure_policy);
        let root = Sequence::from_node(Node::root(config.root_name.clone(), tree));
        tracing::debug!(root = %root.name(), policy = %config.failure_policy, "driver created");
        Self { root, clock, config }
    }

    /// The root node. It has no task body of its own.
    #[must_use]
    pub fn root(&self) -> &Sequence {
        &self.root
    }

    /// The clock this tree runs on.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The node whose task body is running right now, if any.
    #[must_use]
    pub fn current(&self) -> Option<Sequence> {
        self.root.current()
    }

    /// Starts a top-level sequence under the root.
    pub fn spawn<T, F, Fut, E>(&self, name: impl Into<String>, body: F) -> ResultReceiver<T>
    where
        T: Send + 'static,
        F: FnOnce(Sequence) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.root.create_child(name, body)
    }

    /// Starts a top-level sequence running `handler(seq, param)`.
    pub fn spawn_with<T, P, F, Fut, E>(
        &self,
        name: impl Into<String>,
        handler: F,
        param: P,
    ) -> ResultReceiver<T>
    where
        T: Send + 'static,
        F: FnOnce(Sequence, P) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.root.create_child_with(name, handler, param)
    }

    /// Runs one scheduling pass and returns the next wake time.
    ///
    /// # Errors
    ///
    /// See [`Sequence::dispatch`].
    pub fn dispatch(&self) -> Result<Deadline> {
        self.root.dispatch()
    }

    /// `true` once every sequence in the tree has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.root.is_done()
    }

    /// How long the loop may sleep before the next dispatch.
    fn sleep_target(&self, wake: Deadline) -> Deadline {
        wake.min(Deadline::after(self.clock.now(), self.config.max_sleep))
    }

    fn check_ticks(&self, ticks: usize) -> Result<()> {
        match self.config.max_ticks {
            Some(max) if ticks >= max => Err(Error::TickLimit(max)),
            _ => Ok(()),
        }
    }

    /// Dispatches and sleeps until the tree is done. Returns the number of
    /// dispatches.
    ///
    /// With a manual [`MockClock`](crate::clock::MockClock) nothing moves
    /// time forward, so set `max_ticks` or use an auto-advancing clock.
    ///
    /// # Errors
    ///
    /// Any error from [`dispatch`](Self::dispatch), or
    /// [`Error::TickLimit`] when `max_ticks` is reached first.
    pub fn run_until_done(&self) -> Result<usize> {
        let mut ticks = 0;
        loop {
            let wake = self.dispatch()?;
            ticks += 1;
            if self.is_done() {
                tracing::debug!(ticks, "tree finished");
                return Ok(ticks);
            }
            self.check_ticks(ticks)?;
            self.clock.sleep_until(self.sleep_target(wake));
        }
    }

    /// Runs the driver loop for at most `duration` of clock time. Returns
    /// whether the tree finished.
    ///
    /// # Errors
    ///
    /// Same as [`run_until_done`](Self::run_until_done).
    pub fn run_for(&self, duration: Duration) -> Result<bool> {
        let end = Deadline::after(self.clock.now(), duration);
        let mut ticks = 0;
        loop {
            let wake = self.dispatch()?;
            ticks += 1;
            if self.is_done() {
                return Ok(true);
            }
            if end.is_due(self.clock.now()) {
                return Ok(false);
            }
            self.check_ticks(ticks)?;
            self.clock.sleep_until(self.sleep_target(wake).min(end));
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if !self.root.is_done() {
            tracing::debug!(root = %self.root.name(), "driver dropped with live sequences");
        }
        self.root.teardown();
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("root", &self.root)
            .field("now", &self.clock.now())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn mock_driver(config: DriverConfig) -> (Driver, MockClock) {
        let clock = MockClock::auto_advancing();
        (Driver::with_clock(clock.clone(), config), clock)
    }

    #[test]
    fn test_empty_driver_is_done() {
        let (driver, _) = mock_driver(DriverConfig::default());
        assert!(driver.is_done());
        assert_eq!(driver.run_until_done().unwrap(), 1);
        assert_eq!(driver.root().name(), "root");
    }

    #[test]
    fn test_run_until_done_sleeps_to_wake_times() {
        let (driver, clock) = mock_driver(DriverConfig::default());
        let rx = driver.spawn("steps", |seq| async move {
            for _ in 0..4 {
                seq.wait_for(Duration::from_millis(250)).await;
            }
            Ok::<_, Error>(())
        });

        let ticks = driver.run_until_done().unwrap();
        assert_eq!(ticks, 5);
        assert_eq!(clock.now(), Duration::from_secs(1));
        assert!(rx.read().is_ok());
    }

    #[test]
    fn test_sleep_is_capped() {
        let (driver, clock) = mock_driver(DriverConfig::new().max_sleep(Duration::from_secs(1)));
        let _rx = driver.spawn("long", |seq| async move {
            seq.wait_for(Duration::from_millis(3500)).await;
            Ok::<_, Error>(())
        });

        // 0s, 1s, 2s, 3s, 3.5s
        assert_eq!(driver.run_until_done().unwrap(), 5);
        assert_eq!(clock.sleep_count(), 4);
    }

    #[test]
    fn test_tick_limit() {
        let clock = MockClock::new();
        let driver = Driver::with_clock(clock, DriverConfig::new().max_ticks(3));
        let _rx = driver.spawn("stuck", |seq| async move {
            seq.wait_for(Duration::from_secs(1)).await;
            Ok::<_, Error>(())
        });
        assert!(matches!(driver.run_until_done(), Err(Error::TickLimit(3))));
    }

    #[test]
    fn test_run_for_stops_at_limit() {
        let (driver, clock) = mock_driver(DriverConfig::default());
        let rx = driver.spawn("slow", |seq| async move {
            seq.wait_for(Duration::from_secs(10)).await;
            Ok::<_, Error>(())
        });

        assert!(!driver.run_for(Duration::from_secs(4)).unwrap());
        assert_eq!(clock.now(), Duration::from_secs(4));
        assert!(rx.try_read().is_none());

        assert!(driver.run_for(Duration::from_secs(10)).unwrap());
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[test]
    fn test_drop_cancels_live_sequences() {
        let (driver, _) = mock_driver(DriverConfig::default());
        let rx = driver.spawn("forever", |seq| async move {
            let inner = seq.create_child("inner", |seq| async move {
                seq.wait_for(Duration::from_secs(3600)).await;
                Ok::<_, Error>(())
            });
            seq.wait_for_child().await;
            inner.await
        });
        driver.dispatch().unwrap();
        drop(driver);
        assert!(matches!(rx.read(), Err(Error::Cancelled(ref name)) if name == "forever"));
    }

    #[test]
    fn test_spawn_with_param() {
        let (driver, _) = mock_driver(DriverConfig::default());
        let rx = driver.spawn_with(
            "double",
            |_seq, n: u32| async move { Ok::<_, Error>(n * 2) },
            21,
        );
        driver.run_until_done().unwrap();
        assert_eq!(rx.read().unwrap(), 42);
    }

    #[test]
    fn test_failure_stops_loop() {
        let (driver, _) = mock_driver(DriverConfig::default());
        let _rx = driver.spawn("bad", |_seq| async { Err::<(), _>("nope") });
        let err = driver.run_until_done().unwrap_err();
        assert!(err.is_task_failure());
        assert!(driver.is_done());
    }

    #[test]
    fn test_contain_policy_finishes() {
        let (driver, _) = mock_driver(DriverConfig::new().failure_policy(FailurePolicy::Contain));
        let bad = driver.spawn("bad", |_seq| async { Err::<(), _>("nope") });
        let good = driver.spawn("good", |seq| async move {
            seq.wait_for(Duration::from_millis(5)).await;
            Ok::<_, Error>("ok")
        });
        driver.run_until_done().unwrap();
        assert!(bad.read().is_err());
        assert_eq!(good.read().unwrap(), "ok");
    }

    #[test]
    fn test_custom_root_name() {
        let (driver, _) = mock_driver(DriverConfig::new().root_name("main"));
        assert_eq!(driver.root().name(), "main");
        assert!(driver.current().is_none());
    }
}
