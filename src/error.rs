//! Error taxonomy for the shard core.
//!
//! Mirrors the four error categories of the design: user exceptions produced by
//! continuations, broken promises, leaked failures, and invariant violations (the
//! last of which are programming errors and simply panic rather than being
//! represented here).

use std::fmt;

use thiserror::Error;

/// Umbrella error type for fallible, non-exceptional operations exposed by this crate
/// (configuration validation, priority class registration, and the like).
///
/// This is distinct from [`Exception`], which flows through future chains as the
/// payload of a failed completion.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied invalid configuration or called an operation out of sequence.
    #[error("{0}")]
    Programming(String),

    /// A priority class id was used that was never registered.
    #[error("unknown priority class {0:?}")]
    UnknownPriorityClass(crate::fair_queue::ClassId),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The opaque error handle carried by a failed future.
///
/// An `Exception` is produced either by user continuation code, or by the runtime
/// itself (a broken promise, an aborted task, or a re-thrown panic). It propagates
/// along a future chain until a handler consumes it.
#[derive(Debug, Error)]
pub enum Exception {
    /// An error produced by user code running inside a continuation.
    #[error(transparent)]
    User(Box<dyn std::error::Error + 'static>),

    /// A promise was destroyed while still pending, orphaning its attached future.
    #[error("broken promise: the promise was dropped before a value was set")]
    BrokenPromise,

    /// A task was aborted before completion (see [`crate::task`] cancellation notes).
    #[error("task aborted")]
    Aborted,

    /// A continuation's own cleanup (e.g. `finally`) failed after the original
    /// outcome was already known; the new failure is chained with the original as
    /// its cause, matching the cause-chain policy of `nested_exception` without
    /// replicating its exact wrapper type.
    #[error("{context}")]
    Chained {
        context: String,
        #[source]
        cause: Box<Exception>,
    },
}

impl Exception {
    /// Wraps an arbitrary user error as an [`Exception::User`].
    pub fn from_user<E>(error: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::User(Box::new(error))
    }

    /// Wraps a caught panic payload as a user exception carrying the panic message.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "continuation panicked with a non-string payload".to_owned()
        };

        Self::User(Box::new(PanicMessage(message)))
    }

    /// Chains a new failure onto this one, recording it as the cause.
    #[must_use]
    pub fn chain(self, context: impl Into<String>) -> Self {
        Self::Chained {
            context: context.into(),
            cause: Box::new(self),
        }
    }

    /// Returns the user error if this is an [`Exception::User`], for use with
    /// [`std::error::Error::downcast_ref`] by `handle_exception_type`.
    pub fn as_user_error(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::User(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct PanicMessage(String);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.0)
    }
}

impl std::error::Error for PanicMessage {}
