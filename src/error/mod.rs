//! Error definitions
//!
//! This module provides the error type shared by the scheduler, the result
//! channels and the routing map.

use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use thiserror::Error;

/// Boxed error returned by task bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for seqtree
///
/// `Error` is cheap to clone: a failure is delivered both to the failing
/// sequence's result channel and out of the enclosing `dispatch()` call.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// `dispatch()` (or an owner-only lookup) was called off the owner thread.
    #[error("called from thread {actual:?}, but the tree is owned by thread {owner:?}")]
    WrongThread {
        /// Thread that owns the tree.
        owner: ThreadId,
        /// Thread that made the call.
        actual: ThreadId,
    },

    /// `dispatch()` was called from inside a running sequence.
    #[error("dispatch() must not be called from inside a running sequence ({running})")]
    Reentrant {
        /// Name of the sequence that was being resumed.
        running: String,
    },

    /// A task body returned an error.
    #[error("sequence '{name}' failed: {source}")]
    Failed {
        /// Name of the failing sequence.
        name: String,
        /// Error returned by the body.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A task body panicked while being resumed.
    #[error("sequence '{name}' panicked: {message}")]
    Panicked {
        /// Name of the panicking sequence.
        name: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// The sequence was destroyed before it produced a result.
    #[error("sequence '{0}' was destroyed before completing")]
    Cancelled(String),

    /// The result of a sequence was already read.
    #[error("result was already read")]
    AlreadyRead,

    /// A result channel was completed twice.
    #[error("result channel was already completed")]
    AlreadyCompleted,

    /// A blocking read did not see a result in time.
    #[error("no result after {0:?}")]
    ReadTimeout(Duration),

    /// The driver loop hit its configured iteration cap.
    #[error("driver loop exceeded {0} ticks")]
    TickLimit(usize),

    /// An operation that needs the running sequence was called outside one.
    #[error("{0} must be called from a running sequence")]
    NoCurrentSequence(&'static str),

    /// No handler is bound under the requested name.
    #[error("no handler bound for sequence '{0}'")]
    UnknownHandler(String),

    /// No unit with the requested name exists in the map.
    #[error("no unit named '{0}'")]
    UnknownUnit(String),
}

impl Error {
    /// Create a failure error from a task body's error.
    #[must_use]
    pub fn failed(name: impl Into<String>, source: BoxError) -> Self {
        Self::Failed {
            name: name.into(),
            source: Arc::from(source),
        }
    }

    /// Create a panic error from a caught panic payload.
    #[must_use]
    pub fn panicked(name: impl Into<String>, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked {
            name: name.into(),
            message,
        }
    }

    /// Returns `true` for misuse of the scheduler (wrong thread, re-entrancy).
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::WrongThread { .. } | Self::Reentrant { .. })
    }

    /// Returns `true` if this error reports a failed or panicked task body.
    #[must_use]
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Panicked { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
