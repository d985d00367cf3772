//! The unit of scheduled work.
//!
//! A [`Task`] is consumed exactly once by the scheduler: unlike a `std::future::Future`,
//! it is not polled repeatedly. It either completes or is dropped; there is no notion of
//! a task yielding control back to the scheduler mid-run other than by returning.

/// Priority at which a task is placed in the ready queue.
///
/// Urgent tasks (continuations resumed by a completed future) run ahead of normal
/// tasks (freshly spawned work), matching the two-priority queue of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Urgency {
    Urgent,
    Normal,
}

/// A self-contained unit of work that the scheduler runs to completion exactly once.
///
/// Implementors are boxed and own themselves for the duration they sit in the ready
/// queue; `run_and_dispose` consumes the box, so there is no way to re-enqueue the same
/// task object twice by accident.
pub trait Task {
    /// Runs the task to completion and disposes of it.
    ///
    /// Implementations must not unwind a panic out of this call on the happy path of
    /// ordinary user error; continuations convert a panicking closure into an
    /// [`crate::error::Exception`] before this returns (see [`crate::future::Future::then`]).
    /// A genuine invariant violation may still abort the process via a direct panic.
    fn run_and_dispose(self: Box<Self>);
}
