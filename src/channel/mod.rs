//! One-shot result delivery
//!
//! Every sequence owns a [`ResultSender`]; whoever created it holds the
//! matching [`ResultReceiver`]. The outcome is written exactly once, either by
//! the sequence reaching a terminal state or by the sender being dropped
//! (the sequence was destroyed), and read exactly once.
//!
//! # Example
//!
//! ```rust
//! use seqtree::channel::result_channel;
//!
//! let (mut tx, rx) = result_channel::<i32>("answer");
//! assert!(rx.try_read().is_none());
//!
//! tx.complete(Ok(42)).unwrap();
//! assert_eq!(rx.try_read().unwrap().unwrap(), 42);
//!
//! // The outcome is delivered once
//! assert!(rx.try_read().unwrap().is_err());
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Creates a linked sender/receiver pair for the sequence called `name`.
#[must_use]
pub fn result_channel<T>(name: impl Into<String>) -> (ResultSender<T>, ResultReceiver<T>) {
    let shared = Arc::new(Shared {
        name: name.into(),
        slot: Mutex::new(Slot::Empty),
        ready: Condvar::new(),
        waker: Mutex::new(None),
    });
    (
        ResultSender {
            shared: Arc::clone(&shared),
            completed: false,
        },
        ResultReceiver { shared },
    )
}

enum Slot<T> {
    Empty,
    Ready(Result<T>),
    Taken,
}

struct Shared<T> {
    name: String,
    slot: Mutex<Slot<T>>,
    ready: Condvar,
    waker: Mutex<Option<Waker>>,
}

impl<T> Shared<T> {
    fn take_ready(slot: &mut Slot<T>) -> Option<Result<T>> {
        match std::mem::replace(slot, Slot::Taken) {
            Slot::Ready(outcome) => Some(outcome),
            Slot::Taken => Some(Err(Error::AlreadyRead)),
            Slot::Empty => {
                *slot = Slot::Empty;
                None
            }
        }
    }
}

/// Write side of a result channel.
pub struct ResultSender<T> {
    shared: Arc<Shared<T>>,
    completed: bool,
}

impl<T> ResultSender<T> {
    /// Stores the outcome and wakes the reader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyCompleted`] if an outcome was already stored;
    /// the first outcome is kept.
    pub fn complete(&mut self, outcome: Result<T>) -> Result<()> {
        if self.completed {
            return Err(Error::AlreadyCompleted);
        }
        self.completed = true;
        {
            let mut slot = self.shared.slot.lock();
            *slot = Slot::Ready(outcome);
            self.shared.ready.notify_all();
        }
        if let Some(waker) = self.shared.waker.lock().take() {
            waker.wake();
        }
        Ok(())
    }

    /// Returns `true` once an outcome has been stored.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Name of the sequence this channel belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl<T> Drop for ResultSender<T> {
    fn drop(&mut self) {
        if !self.completed {
            let name = self.shared.name.clone();
            let _ = self.complete(Err(Error::Cancelled(name)));
        }
    }
}

impl<T> fmt::Debug for ResultSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSender")
            .field("name", &self.shared.name)
            .field("completed", &self.completed)
            .finish()
    }
}

/// Read side of a result channel.
///
/// Reads come in three flavors: [`try_read`](Self::try_read) never blocks,
/// [`read`](Self::read) blocks the calling thread, and awaiting the receiver
/// suspends the calling task. Whichever runs first consumes the outcome;
/// later reads return [`Error::AlreadyRead`].
pub struct ResultReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ResultReceiver<T> {
    /// Name of the sequence this channel belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns `true` if an outcome is waiting to be read.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.shared.slot.lock(), Slot::Ready(_))
    }

    /// Takes the outcome if one is available.
    ///
    /// Returns `None` while the sequence is still running.
    #[must_use]
    pub fn try_read(&self) -> Option<Result<T>> {
        Shared::take_ready(&mut self.shared.slot.lock())
    }

    /// Blocks until the outcome is available and takes it.
    ///
    /// Never call this on the thread that dispatches the tree while the tree
    /// is idle: nothing would ever complete the channel.
    ///
    /// # Errors
    ///
    /// Returns the sequence's failure, [`Error::Cancelled`] if it was destroyed,
    /// or [`Error::AlreadyRead`] on a second read.
    pub fn read(&self) -> Result<T> {
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(outcome) = Shared::take_ready(&mut slot) {
                return outcome;
            }
            self.shared.ready.wait(&mut slot);
        }
    }

    /// Like [`read`](Self::read), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadTimeout`] if nothing arrived in time, otherwise the
    /// same errors as [`read`](Self::read).
    pub fn read_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(outcome) = Shared::take_ready(&mut slot) {
                return outcome;
            }
            if self.shared.ready.wait_until(&mut slot, deadline).timed_out() {
                return Shared::take_ready(&mut slot).unwrap_or(Err(Error::ReadTimeout(timeout)));
            }
        }
    }
}

impl<T> Future for ResultReceiver<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.try_read() {
            return Poll::Ready(outcome);
        }
        *self.shared.waker.lock() = Some(cx.waker().clone());
        // The sender may have completed between the check and the registration.
        match self.try_read() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for ResultReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultReceiver")
            .field("name", &self.shared.name)
            .field("is_ready", &self.is_ready())
            .finish()
    }
}
