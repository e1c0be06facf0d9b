//! The scheduling pass: children to quiescence, then the node itself.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Deadline;
use crate::driver::FailurePolicy;
use crate::error::{Error, Result};
use crate::frame::Frame;

use super::Node;

impl Node {
    /// One scheduling pass over this subtree at time `now`.
    ///
    /// Returns whether the node is still alive afterwards.
    pub(crate) fn dispatch_node(self: &Arc<Self>, now: Duration) -> Result<bool> {
        let mut resumed = false;
        loop {
            self.drain_children(now)?;
            if resumed || self.has_children() || !self.own_wake_due(now) {
                break;
            }
            resumed = true;
            self.resume_self(now)?;
            // Children spawned by the resume are drained on the next round.
            if !self.has_children() {
                break;
            }
        }
        Ok(!self.is_done())
    }

    /// Services every due child until no child is due any more, reaping the
    /// ones that finished, and refreshes `child_wake` on the way.
    fn drain_children(&self, now: Duration) -> Result<()> {
        loop {
            self.state.lock().child_wake = Deadline::NEVER;
            let children = self.children.lock().clone();
            if children.is_empty() {
                return Ok(());
            }

            let mut reaped = Vec::new();
            let mut failure = None;
            for child in &children {
                // Finished outside this pass, e.g. by its own `dispatch()`.
                if child.is_done() && child.detach() {
                    reaped.push(Arc::clone(child));
                    continue;
                }
                let wake = child.aggregate_wake();
                if !wake.is_due(now) {
                    self.state.lock().lower_child_wake(wake);
                    continue;
                }
                match child.dispatch_node(now) {
                    // A child injected since the done check keeps the node.
                    Ok(alive) if alive || !child.detach() => {
                        let wake = child.aggregate_wake();
                        self.state.lock().lower_child_wake(wake);
                    }
                    Ok(_) => reaped.push(Arc::clone(child)),
                    Err(err) => {
                        if child.is_done() && child.detach() {
                            reaped.push(Arc::clone(child));
                        }
                        // The rest of the list was not scanned.
                        self.state.lock().lower_child_wake(Deadline::IMMEDIATE);
                        failure = Some(err);
                        break;
                    }
                }
            }

            if !reaped.is_empty() {
                self.children
                    .lock()
                    .retain(|child| !reaped.iter().any(|done| Arc::ptr_eq(child, done)));
                for child in &reaped {
                    tracing::trace!(
                        parent = %self.name,
                        child = %child.name,
                        id = %child.id,
                        "sequence reaped"
                    );
                }
            }
            if let Some(err) = failure {
                return Err(err);
            }

            let due_again = self.has_children() && self.state.lock().child_wake.is_due(now);
            if !due_again {
                return Ok(());
            }
        }
    }

    /// Runs the node's own frame if it is due, honoring an outstanding
    /// predicate-wait.
    fn resume_self(self: &Arc<Self>, now: Duration) -> Result<()> {
        let pending = {
            let mut state = self.state.lock();
            state.own_wake = Deadline::NEVER;
            state.predicate.take()
        };
        let Some(mut pending) = pending else {
            return self.resume_frame();
        };

        if pending.is_expired(now) {
            tracing::debug!(
                sequence = %self.name,
                timeout = ?pending.timeout,
                "predicate wait timed out"
            );
            let _ = pending.sender.complete(Ok(false));
            return self.resume_frame();
        }

        self.enter();
        let evaluated = panic::catch_unwind(AssertUnwindSafe(|| (pending.predicate)()));
        self.leave();

        match evaluated {
            Ok(true) => {
                let _ = pending.sender.complete(Ok(true));
                self.resume_frame()
            }
            Ok(false) => {
                let mut state = self.state.lock();
                state.own_wake = Deadline::after(now, pending.interval);
                state.predicate = Some(pending);
                Ok(())
            }
            Err(payload) => {
                // The waiting body is failed without being resumed.
                let err = Error::panicked(self.name.clone(), payload.as_ref());
                self.drive_frame(|frame| frame.abort(err))
            }
        }
    }

    fn resume_frame(self: &Arc<Self>) -> Result<()> {
        self.drive_frame(|frame| {
            tracing::trace!(sequence = %self.name, id = %self.id, "resuming");
            frame.resume();
        })
    }

    /// Applies `step` to the node's frame, then settles the outcome: a
    /// finished frame is retired and a failure tears the subtree down.
    fn drive_frame(self: &Arc<Self>, step: impl FnOnce(&mut dyn Frame)) -> Result<()> {
        let Some(mut frame) = self.frame.lock().take() else {
            self.state.lock().frame_live = false;
            return Ok(());
        };

        self.enter();
        step(&mut *frame);
        self.leave();

        let failure = frame.take_failure();
        if frame.is_done() {
            self.state.lock().frame_live = false;
        } else if self.frame_live() {
            *self.frame.lock() = Some(frame);
        } else {
            // Torn down from inside its own resume.
            frame.destroy();
        }

        let Some(err) = failure else {
            return Ok(());
        };
        let children = std::mem::take(&mut *self.children.lock());
        for child in children {
            child.teardown();
        }
        match self.tree.policy {
            FailurePolicy::Propagate => Err(err),
            FailurePolicy::Contain => {
                tracing::warn!(sequence = %self.name, error = %err, "sequence failed");
                Ok(())
            }
        }
    }

    /// The frame is live and its own wake time has come.
    fn own_wake_due(&self, now: Duration) -> bool {
        let state = self.state.lock();
        state.frame_live && state.own_wake.is_due(now)
    }

    fn enter(self: &Arc<Self>) {
        *self.tree.current.lock() = Some(Arc::clone(self));
    }

    fn leave(&self) {
        *self.tree.current.lock() = None;
    }
}
