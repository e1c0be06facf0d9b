//! # seqtree 🌳
//!
//! > Cooperative, hierarchical sequence scheduling
//!
//! **seqtree** runs long-lived async task bodies ("sequences") as a tree on a
//! single owner thread. A sequence can fork children, wait for time to pass,
//! wait for all of its children, or poll a predicate; the tree is advanced
//! only by an explicit [`Driver::dispatch`] call, which always drives children
//! to quiescence before their parent resumes.
//!
//! ## Quick Start
//!
//! ```rust
//! use seqtree::prelude::*;
//!
//! let clock = MockClock::auto_advancing();
//! let driver = Driver::with_clock(clock.clone(), DriverConfig::default());
//!
//! let total = driver.spawn("parent", |seq| async move {
//!     let slow = seq.create_child("slow", |seq| async move {
//!         seq.wait_for(Duration::from_millis(500)).await;
//!         Ok::<_, Error>(2)
//!     });
//!     let fast = seq.create_child("fast", |seq| async move {
//!         seq.wait_for(Duration::from_millis(100)).await;
//!         Ok::<_, Error>(1)
//!     });
//!     seq.wait_for_child().await;
//!     Ok::<_, Error>(slow.await? + fast.await?)
//! });
//!
//! driver.run_until_done().unwrap();
//! assert_eq!(total.read().unwrap(), 3);
//! assert_eq!(clock.now(), Duration::from_millis(500));
//! ```
//!
//! ## Features
//!
//! - 🌲 **Sequence tree** - Children always finish before their parent resumes
//! - ⏱️ **Wake-time cache** - Idle subtrees are skipped without rescanning
//! - 📬 **Result channels** - One-shot, blocking or awaitable outcomes
//! - 🧵 **Thread affinity** - One owner thread; other threads may only add work
//! - 🗺️ **Routing map** - Start sequences by name from a tree of units
//! - 🧪 **Mock clock** - Whole timelines run instantly in tests

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Clocks and deadlines
pub mod clock;

pub mod channel;
pub mod driver;
pub mod error;
pub mod frame;
pub mod map;
pub mod sequence;

/// Prelude for convenient imports
///
/// ```rust
/// use seqtree::prelude::*;
/// ```
pub mod prelude {
    pub use crate::channel::{ResultReceiver, ResultSender};
    pub use crate::clock::{Clock, Deadline, MockClock, SystemClock};
    pub use crate::driver::{Driver, DriverConfig, FailurePolicy};
    pub use crate::error::{BoxError, Error, Result};
    pub use crate::map::SequenceMap;
    pub use crate::sequence::{Sequence, SequenceId};
    pub use std::time::Duration;
}

// Re-exports
pub use driver::{Driver, DriverConfig, FailurePolicy};
pub use error::{BoxError, Error, Result};
pub use sequence::Sequence;

// Re-export the test macro when macros feature is enabled
#[cfg(feature = "macros")]
pub use seqtree_macros::test;
