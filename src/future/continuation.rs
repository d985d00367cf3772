//! The task created when a continuation closure is attached to a future that is not
//! yet resolved, plus the shared "run this continuation's body" logic reused by both
//! the scheduled task path and the inline fast path.
//!
//! Grounded on `oxidizer_rt::executor::AsyncTaskExecutor`'s pattern of boxing a unit of
//! work and handing it to the scheduler, adapted from poll-based tasks to the
//! run-once `Task` contract used throughout this crate. The fast-path/scheduled-path
//! split itself is grounded in the scheduler's `need_preempt()` contract from
//! `spec.md` §4.E, for which there is no Rust precedent in the pack since
//! `oxidizer_rt` tasks are always polled rather than run inline.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::Exception;
use crate::scheduler::Reactor;
use crate::task::{Task, Urgency};

use super::promise::Promise;
use super::state::Outcome;

fn run_map<T, U>(f: impl FnOnce(T) -> U, promise: Promise<U>, outcome: Outcome<T>) {
    match outcome {
        Outcome::Exception(e) => promise.set_exception(e),
        Outcome::Value(v) => match catch_unwind(AssertUnwindSafe(|| f(v))) {
            Ok(result) => promise.set_value(result),
            Err(payload) => promise.set_exception(Exception::from_panic(payload)),
        },
    }
}

fn run_then_future<T, U>(
    f: impl FnOnce(T) -> super::Future<U>,
    promise: Promise<U>,
    outcome: Outcome<T>,
) {
    match outcome {
        Outcome::Exception(e) => promise.set_exception(e),
        Outcome::Value(v) => match catch_unwind(AssertUnwindSafe(|| f(v))) {
            Ok(next) => next.forward_to_shared(promise.into_shared()),
            Err(payload) => promise.set_exception(Exception::from_panic(payload)),
        },
    }
}

fn run_wrapped<T, U>(
    f: impl FnOnce(Outcome<T>) -> super::Future<U>,
    promise: Promise<U>,
    outcome: Outcome<T>,
) {
    match catch_unwind(AssertUnwindSafe(|| f(outcome))) {
        Ok(next) => next.forward_to_shared(promise.into_shared()),
        Err(payload) => promise.set_exception(Exception::from_panic(payload)),
    }
}

pub(crate) struct MapContinuation<T, U, F> {
    pub(crate) f: F,
    pub(crate) promise: Promise<U>,
    pub(crate) outcome: Outcome<T>,
}

impl<T, U, F> Task for MapContinuation<T, U, F>
where
    F: FnOnce(T) -> U,
{
    fn run_and_dispose(self: Box<Self>) {
        run_map(self.f, self.promise, self.outcome);
    }
}

pub(crate) struct ThenFutureContinuation<T, U, F> {
    pub(crate) f: F,
    pub(crate) promise: Promise<U>,
    pub(crate) outcome: Outcome<T>,
}

impl<T, U, F> Task for ThenFutureContinuation<T, U, F>
where
    F: FnOnce(T) -> super::Future<U>,
{
    fn run_and_dispose(self: Box<Self>) {
        run_then_future(self.f, self.promise, self.outcome);
    }
}

pub(crate) struct WrappedContinuation<T, U, F> {
    pub(crate) f: F,
    pub(crate) promise: Promise<U>,
    pub(crate) outcome: Outcome<T>,
}

impl<T, U, F> Task for WrappedContinuation<T, U, F>
where
    F: FnOnce(Outcome<T>) -> super::Future<U>,
{
    fn run_and_dispose(self: Box<Self>) {
        run_wrapped(self.f, self.promise, self.outcome);
    }
}

/// True if a reactor is entered on this thread and it has not exhausted its
/// preemption budget, in which case a continuation on an already-resolved future may
/// run inline instead of being scheduled as a separate task.
fn fast_path_allowed() -> bool {
    Reactor::try_current().is_some_and(|reactor| !reactor.need_preempt())
}

/// Dispatches a `then`-style continuation: runs it inline if the fast path is open,
/// otherwise schedules it as an urgent task.
pub(crate) fn dispatch_map<T, U>(
    f: impl FnOnce(T) -> U + 'static,
    promise: Promise<U>,
    outcome: Outcome<T>,
) where
    T: 'static,
    U: 'static,
{
    if fast_path_allowed() {
        run_map(f, promise, outcome);
    } else {
        schedule(
            Box::new(MapContinuation { f, promise, outcome }),
            Urgency::Urgent,
        );
    }
}

pub(crate) fn dispatch_then_future<T, U>(
    f: impl FnOnce(T) -> super::Future<U> + 'static,
    promise: Promise<U>,
    outcome: Outcome<T>,
) where
    T: 'static,
    U: 'static,
{
    if fast_path_allowed() {
        run_then_future(f, promise, outcome);
    } else {
        schedule(
            Box::new(ThenFutureContinuation { f, promise, outcome }),
            Urgency::Urgent,
        );
    }
}

pub(crate) fn dispatch_wrapped<T, U>(
    f: impl FnOnce(Outcome<T>) -> super::Future<U> + 'static,
    promise: Promise<U>,
    outcome: Outcome<T>,
) where
    T: 'static,
    U: 'static,
{
    if fast_path_allowed() {
        run_wrapped(f, promise, outcome);
    } else {
        schedule(
            Box::new(WrappedContinuation { f, promise, outcome }),
            Urgency::Urgent,
        );
    }
}

/// Schedules a `then`-style continuation unconditionally, for the case where it is
/// being attached as a waiter on a still-pending future: when that future later
/// resolves, the continuation must run as a fresh scheduler turn rather than inline
/// within the promise-setter's call stack, regardless of the preemption budget.
pub(crate) fn schedule_map<T, U>(
    f: impl FnOnce(T) -> U + 'static,
    promise: Promise<U>,
    outcome: Outcome<T>,
) where
    T: 'static,
    U: 'static,
{
    schedule(
        Box::new(MapContinuation { f, promise, outcome }),
        Urgency::Urgent,
    );
}

pub(crate) fn schedule_then_future<T, U>(
    f: impl FnOnce(T) -> super::Future<U> + 'static,
    promise: Promise<U>,
    outcome: Outcome<T>,
) where
    T: 'static,
    U: 'static,
{
    schedule(
        Box::new(ThenFutureContinuation { f, promise, outcome }),
        Urgency::Urgent,
    );
}

pub(crate) fn schedule_wrapped<T, U>(
    f: impl FnOnce(Outcome<T>) -> super::Future<U> + 'static,
    promise: Promise<U>,
    outcome: Outcome<T>,
) where
    T: 'static,
    U: 'static,
{
    schedule(
        Box::new(WrappedContinuation { f, promise, outcome }),
        Urgency::Urgent,
    );
}

/// Schedules `task` onto the currently-entered reactor at the given urgency.
///
/// # Panics
///
/// Panics if no reactor is entered on the current thread.
pub(crate) fn schedule(task: Box<dyn Task>, urgency: Urgency) {
    use crate::collaborators::Schedule;
    Reactor::current().schedule(task, urgency);
}
