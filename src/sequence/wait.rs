//! Suspension primitives.
//!
//! Each primitive registers its wake condition on the node the first time it
//! is polled and reports `Pending` exactly once; the dispatch pass decides
//! when the frame runs again. Their wakers are never used.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::channel::{result_channel, ResultReceiver};
use crate::clock::Deadline;

use super::state::PendingPredicate;
use super::Sequence;

impl Sequence {
    /// Suspends the task body for `delay`.
    ///
    /// The body is not resumed before `now + delay`, and is resumed by the
    /// first dispatch at or after that time. A zero delay makes the node
    /// immediately due again, so the pass that suspended it resumes it again
    /// right away.
    pub fn wait_for(&self, delay: Duration) -> WaitFor {
        WaitFor {
            seq: self.clone(),
            delay,
            armed: false,
        }
    }

    /// Suspends the task body until the clock reaches `deadline`.
    pub fn wait_until(&self, deadline: Deadline) -> WaitUntil {
        WaitUntil {
            seq: self.clone(),
            deadline,
            armed: false,
        }
    }

    /// Suspends the task body until every child has finished and been
    /// reaped. Completes without suspending when there are no children.
    pub fn wait_for_child(&self) -> WaitForChild {
        WaitForChild {
            seq: self.clone(),
            armed: false,
        }
    }

    /// Polls `predicate` every `interval` (on the owner thread, at due
    /// ticks only) until it returns `true`. Never gives up.
    pub fn wait<P>(&self, predicate: P, interval: Duration) -> WaitPredicate
    where
        P: FnMut() -> bool + Send + 'static,
    {
        self.wait_timeout(predicate, interval, Duration::MAX)
    }

    /// Like [`wait`](Self::wait), but resolves to `false` once strictly more
    /// than `timeout` has passed since the first poll without the predicate
    /// holding. The predicate is first evaluated one `interval` after
    /// registration.
    pub fn wait_timeout<P>(
        &self,
        predicate: P,
        interval: Duration,
        timeout: Duration,
    ) -> WaitPredicate
    where
        P: FnMut() -> bool + Send + 'static,
    {
        WaitPredicate {
            seq: self.clone(),
            registration: Some(Registration {
                predicate: Box::new(predicate),
                interval,
                timeout,
            }),
            outcome: None,
        }
    }
}

/// Future returned by [`Sequence::wait_for`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct WaitFor {
    seq: Sequence,
    delay: Duration,
    armed: bool,
}

impl Future for WaitFor {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.armed {
            return Poll::Ready(());
        }
        self.armed = true;
        let wake = Deadline::after(self.seq.inner.tree.now(), self.delay);
        self.seq.reserve_resume(wake);
        Poll::Pending
    }
}

/// Future returned by [`Sequence::wait_until`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct WaitUntil {
    seq: Sequence,
    deadline: Deadline,
    armed: bool,
}

impl Future for WaitUntil {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.armed {
            return Poll::Ready(());
        }
        self.armed = true;
        let deadline = self.deadline;
        self.seq.reserve_resume(deadline);
        Poll::Pending
    }
}

/// Future returned by [`Sequence::wait_for_child`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct WaitForChild {
    seq: Sequence,
    armed: bool,
}

impl Future for WaitForChild {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        // Children always run to completion before the parent resumes.
        if self.armed || self.seq.child_count() == 0 {
            return Poll::Ready(());
        }
        self.armed = true;
        self.seq.reserve_resume(Deadline::IMMEDIATE);
        Poll::Pending
    }
}

struct Registration {
    predicate: super::state::Predicate,
    interval: Duration,
    timeout: Duration,
}

/// Future returned by [`Sequence::wait`] and [`Sequence::wait_timeout`].
///
/// Resolves to `true` if the predicate held, `false` on timeout.
#[must_use = "futures do nothing unless awaited"]
pub struct WaitPredicate {
    seq: Sequence,
    registration: Option<Registration>,
    outcome: Option<ResultReceiver<bool>>,
}

impl Future for WaitPredicate {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<bool> {
        if let Some(Registration {
            predicate,
            interval,
            timeout,
        }) = self.registration.take()
        {
            let node = &self.seq.inner;
            let now = node.tree.now();
            let (sender, receiver) = result_channel(format!("{}::wait", node.name));
            node.state.lock().predicate = Some(PendingPredicate {
                predicate,
                interval,
                registered_at: now,
                timeout,
                sender,
            });
            self.seq.reserve_resume(Deadline::after(now, interval));
            self.outcome = Some(receiver);
            return Poll::Pending;
        }

        // A wait superseded by a newer one on the same node reads
        // `Cancelled`: its predicate never held.
        match self.outcome.as_ref().and_then(ResultReceiver::try_read) {
            Some(outcome) => Poll::Ready(outcome.unwrap_or(false)),
            None => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for WaitPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitPredicate")
            .field("seq", &self.seq.name())
            .field("registered", &self.outcome.is_some())
            .finish()
    }
}
