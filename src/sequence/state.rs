//! Per-node scheduling bookkeeping.

use std::fmt;
use std::time::Duration;

use crate::channel::ResultSender;
use crate::clock::Deadline;

/// Predicate polled by [`Sequence::wait`](super::Sequence::wait).
pub(crate) type Predicate = Box<dyn FnMut() -> bool + Send + 'static>;

/// An outstanding predicate-wait.
pub(crate) struct PendingPredicate {
    pub(crate) predicate: Predicate,
    pub(crate) interval: Duration,
    pub(crate) registered_at: Duration,
    pub(crate) timeout: Duration,
    pub(crate) sender: ResultSender<bool>,
}

impl PendingPredicate {
    /// Strictly more than `timeout` has passed since registration.
    pub(crate) fn is_expired(&self, now: Duration) -> bool {
        now.saturating_sub(self.registered_at) > self.timeout
    }
}

impl fmt::Debug for PendingPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingPredicate")
            .field("interval", &self.interval)
            .field("registered_at", &self.registered_at)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Scheduling state of one node.
///
/// `child_wake` is a cache: between full dispatch passes it is only ever
/// lowered (by propagation), so it stays at least as early as the true
/// minimum over the subtree.
#[derive(Debug)]
pub(crate) struct DispatchState {
    /// When the node's own frame should next run; meaningful only while the
    /// node has no children.
    pub(crate) own_wake: Deadline,
    /// Cached minimum wake time over the children's subtrees.
    pub(crate) child_wake: Deadline,
    /// The node owns a frame that has not reached a terminal state.
    pub(crate) frame_live: bool,
    /// Present only while a predicate-wait is outstanding.
    pub(crate) predicate: Option<PendingPredicate>,
}

impl DispatchState {
    /// State of a freshly created node: immediately due if it has a frame.
    pub(crate) fn new(frame_live: bool) -> Self {
        Self {
            own_wake: Deadline::IMMEDIATE,
            child_wake: Deadline::NEVER,
            frame_live,
            predicate: None,
        }
    }

    /// The wake time this node reports to its parent.
    pub(crate) fn aggregate(&self, has_children: bool) -> Deadline {
        if has_children {
            self.child_wake
        } else if self.frame_live {
            self.own_wake
        } else {
            Deadline::NEVER
        }
    }

    /// Lowers the cached child wake time; returns `false` if the cache was
    /// already at least as early.
    pub(crate) fn lower_child_wake(&mut self, wake: Deadline) -> bool {
        if self.child_wake <= wake {
            return false;
        }
        self.child_wake = wake;
        true
    }
}
