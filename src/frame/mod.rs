//! Suspended computations backing a sequence.
//!
//! A [`Frame`] is the type-erased surface the tree uses to drive a task body,
//! whatever value that body eventually produces. [`TaskFrame`] is the one
//! implementation per result type: it owns the boxed future and the
//! [`ResultSender`] the outcome goes to.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;

use crate::channel::ResultSender;
use crate::error::{BoxError, Error};

/// Lifecycle of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// Waiting to be resumed (also the initial state).
    Suspended,
    /// Currently inside `resume()`.
    Running,
    /// The body returned a value.
    Completed,
    /// The body returned an error or panicked.
    Failed,
    /// The frame was destroyed before reaching a terminal state.
    Destroyed,
}

impl FrameState {
    /// Returns `true` for states that can never be resumed again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Destroyed)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameState::Suspended => write!(f, "Suspended"),
            FrameState::Running => write!(f, "Running"),
            FrameState::Completed => write!(f, "Completed"),
            FrameState::Failed => write!(f, "Failed"),
            FrameState::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// A suspended computation the tree can resume.
///
/// Frames carry no internal synchronization; the owning node guarantees that
/// `resume` is never called concurrently on the same frame.
pub trait Frame: Send {
    /// Runs the computation until it completes or reaches its next
    /// suspension point. Only valid while `!is_done()`.
    fn resume(&mut self) -> FrameState;

    /// Returns `true` once the computation reached a terminal state.
    fn is_done(&self) -> bool;

    /// Takes the failure captured by the last `resume`, if any.
    fn take_failure(&mut self) -> Option<Error>;

    /// Drops the suspended computation without running its continuation.
    fn destroy(&mut self);

    /// Ends the computation with `err` instead of resuming it. The failure
    /// is reported as if the body had produced it.
    fn abort(&mut self, err: Error);
}

/// Boxed task body producing a `T`.
pub type BoxedBody<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send + 'static>>;

/// The [`Frame`] for a task body whose result type is `T`.
pub struct TaskFrame<T> {
    name: String,
    body: Option<BoxedBody<T>>,
    sender: ResultSender<T>,
    state: FrameState,
    failure: Option<Error>,
    resumes: usize,
}

impl<T: Send + 'static> TaskFrame<T> {
    /// Wraps `body`; the outcome is delivered to `sender`.
    pub fn new<F, E>(name: impl Into<String>, body: F, sender: ResultSender<T>) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let body: BoxedBody<T> =
            Box::pin(async move { body.await.map_err(Into::<BoxError>::into) });
        Self {
            name: name.into(),
            body: Some(body),
            sender,
            state: FrameState::Suspended,
            failure: None,
            resumes: 0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of times the frame was resumed.
    #[must_use]
    pub fn resume_count(&self) -> usize {
        self.resumes
    }

    fn finish(&mut self, outcome: Result<T, Error>) {
        self.body = None;
        if let Err(err) = &outcome {
            self.state = FrameState::Failed;
            self.failure = Some(err.clone());
        } else {
            self.state = FrameState::Completed;
        }
        let _ = self.sender.complete(outcome);
    }
}

impl<T: Send + 'static> Frame for TaskFrame<T> {
    fn resume(&mut self) -> FrameState {
        let Some(body) = self.body.as_mut() else {
            return self.state;
        };
        self.state = FrameState::Running;
        self.resumes += 1;

        // Wake-ups come from the tree's wake times, never from wakers.
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        let polled = AssertUnwindSafe(body.as_mut()).catch_unwind().poll_unpin(&mut cx);
        match polled {
            Poll::Pending => self.state = FrameState::Suspended,
            Poll::Ready(Ok(Ok(value))) => self.finish(Ok(value)),
            Poll::Ready(Ok(Err(err))) => {
                let err = Error::failed(self.name.clone(), err);
                self.finish(Err(err));
            }
            Poll::Ready(Err(payload)) => {
                let err = Error::panicked(self.name.clone(), payload.as_ref());
                self.finish(Err(err));
            }
        }
        self.state
    }

    fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    fn take_failure(&mut self) -> Option<Error> {
        self.failure.take()
    }

    fn abort(&mut self, err: Error) {
        if self.body.is_some() {
            self.finish(Err(err));
        }
    }

    fn destroy(&mut self) {
        if self.body.take().is_some() {
            self.state = FrameState::Destroyed;
            let _ = self.sender.complete(Err(Error::Cancelled(self.name.clone())));
        }
    }
}

impl<T> fmt::Debug for TaskFrame<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFrame")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("resumes", &self.resumes)
            .finish_non_exhaustive()
    }
}
