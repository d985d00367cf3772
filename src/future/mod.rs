//! Futures, promises, and the continuations chained onto them (Components B, C, D).

mod continuation;
mod promise;
mod state;

pub use promise::Promise;
pub use state::Outcome;

use negative_impl::negative_impl;

use crate::error::Exception;

use state::{Shared, Waiter};

/// Creates a connected future/promise pair: the future is fulfilled once, by setting
/// the promise (or by dropping it, which breaks the future).
pub fn channel<T>() -> (Promise<T>, Future<T>) {
    let shared = Shared::new_pending();
    (Promise::new(shared.clone()), Future::from_shared(shared))
}

/// A future that is already resolved with `value`.
pub fn ready<T>(value: T) -> Future<T> {
    Future::from_shared(Shared::new_ready(Outcome::Value(value)))
}

/// A future that is already resolved with `exception`.
pub fn ready_error<T>(exception: Exception) -> Future<T> {
    Future::from_shared(Shared::new_ready(Outcome::Exception(exception)))
}

/// The read side of a future/promise pair.
///
/// A `Future<T>` is a handle to a value that may not exist yet. It is consumed by
/// exactly one of: a terminal read (`get0`), a combinator (`then`, `then_future`,
/// `then_wrapped`, `finally`, `handle_exception*`), or `forward_to`. Dropping a future
/// that still holds an uninspected exception is reported to the current reactor's
/// [`crate::collaborators::FailedFutureSink`] (and, absent a reactor, logged directly).
pub struct Future<T> {
    shared: Shared<T>,
}

#[negative_impl]
impl<T> !Send for Future<T> {}
#[negative_impl]
impl<T> !Sync for Future<T> {}

impl<T> Future<T> {
    fn from_shared(shared: Shared<T>) -> Self {
        Self { shared }
    }

    /// True if this future has a value or exception ready to be read.
    pub fn available(&self) -> bool {
        self.shared.is_available()
    }

    /// True if this future is available and holds an exception.
    pub fn failed(&self) -> bool {
        self.shared.is_failed()
    }

    /// Reads the resolved outcome out of this future.
    ///
    /// # Panics
    ///
    /// Panics if the future is not yet available. Callers that don't already know a
    /// future is resolved should use a combinator instead of calling this directly.
    pub fn get0(self) -> Result<T, Exception> {
        match self.shared.take_outcome() {
            Outcome::Value(v) => Ok(v),
            Outcome::Exception(e) => Err(e),
        }
    }

    /// Discards this future's eventual outcome without reporting a leaked exception,
    /// for call sites that intentionally don't care whether it succeeded.
    pub fn ignore(self) {
        self.shared.ignore();
    }

    /// Maps a successful value through `f`, short-circuiting an exception straight to
    /// the result future untouched. If this future is already resolved, `f` runs
    /// inline right away unless the current reactor's preemption budget is exhausted;
    /// otherwise (or if this future is still pending) it runs later as a scheduled
    /// urgent continuation.
    ///
    /// Only plain-value-returning closures are supported here; use
    /// [`Future::then_future`] for a closure that itself needs to perform further
    /// asynchronous work.
    pub fn then<U>(self, f: impl FnOnce(T) -> U + 'static) -> Future<U>
    where
        T: 'static,
        U: 'static,
    {
        let (promise, next) = channel();
        if self.shared.is_available() {
            let outcome = self.shared.take_outcome();
            continuation::dispatch_map(f, promise, outcome);
        } else {
            self.shared.attach(Waiter::Continuation(Box::new(move |outcome| {
                continuation::schedule_map(f, promise, outcome);
            })));
        }
        next
    }

    /// Like [`Future::then`], but `f` itself returns a [`Future<U>`], which is spliced
    /// into the result without an extra scheduling hop once it resolves.
    pub fn then_future<U>(self, f: impl FnOnce(T) -> Future<U> + 'static) -> Future<U>
    where
        T: 'static,
        U: 'static,
    {
        let (promise, next) = channel();
        if self.shared.is_available() {
            let outcome = self.shared.take_outcome();
            continuation::dispatch_then_future(f, promise, outcome);
        } else {
            self.shared.attach(Waiter::Continuation(Box::new(move |outcome| {
                continuation::schedule_then_future(f, promise, outcome);
            })));
        }
        next
    }

    /// Runs `f` on the whole [`Outcome`] (value or exception) rather than just the
    /// value, and splices the [`Future<U>`] it returns into the result. Use this to
    /// observe, translate, or recover from a failure.
    pub fn then_wrapped<U>(self, f: impl FnOnce(Outcome<T>) -> Future<U> + 'static) -> Future<U>
    where
        T: 'static,
        U: 'static,
    {
        let (promise, next) = channel();
        if self.shared.is_available() {
            let outcome = self.shared.take_outcome();
            continuation::dispatch_wrapped(f, promise, outcome);
        } else {
            self.shared.attach(Waiter::Continuation(Box::new(move |outcome| {
                continuation::schedule_wrapped(f, promise, outcome);
            })));
        }
        next
    }

    /// Runs `f` once this future settles, regardless of outcome, then passes the
    /// original outcome through unchanged, unless `f` itself fails, in which case the
    /// new failure is chained onto the original as its cause.
    pub fn finally(self, f: impl FnOnce() + 'static) -> Future<T>
    where
        T: 'static,
    {
        self.then_wrapped(move |outcome| match catch_and_chain(f, outcome) {
            Ok(outcome) => match outcome {
                Outcome::Value(v) => ready(v),
                Outcome::Exception(e) => ready_error(e),
            },
            Err(chained) => ready_error(chained),
        })
    }

    /// Recovers from any exception by producing a replacement value with `f`; passes a
    /// successful value through untouched.
    pub fn handle_exception(self, f: impl FnOnce(Exception) -> T + 'static) -> Future<T>
    where
        T: 'static,
    {
        self.then_wrapped(move |outcome| match outcome {
            Outcome::Value(v) => ready(v),
            Outcome::Exception(e) => ready(f(e)),
        })
    }

    /// Like [`Future::handle_exception`], but only recovers if the exception is a
    /// [`Exception::User`] wrapping a `E`; any other exception (including a `User` of a
    /// different type) passes through unchanged.
    pub fn handle_exception_type<E, F>(self, f: F) -> Future<T>
    where
        T: 'static,
        E: std::error::Error + 'static,
        F: FnOnce(&E) -> T + 'static,
    {
        self.then_wrapped(move |outcome| match outcome {
            Outcome::Value(v) => ready(v),
            Outcome::Exception(e) => match e.as_user_error().and_then(|err| err.downcast_ref::<E>()) {
                Some(typed) => {
                    let recovered = f(typed);
                    ready(recovered)
                }
                None => ready_error(e),
            },
        })
    }

    /// Drops the value, keeping only whether this future succeeded or failed.
    pub fn discard_result(self) -> Future<()>
    where
        T: 'static,
    {
        self.then(|_| ())
    }

    /// Aborts the process if this future ever fails; passes a successful value through.
    pub fn or_terminate(self) -> Future<T>
    where
        T: 'static,
    {
        self.then_wrapped(|outcome| match outcome {
            Outcome::Value(v) => ready(v),
            Outcome::Exception(e) => {
                tracing::error!(error = %e, "or_terminate: aborting process on exceptional future");
                std::process::abort();
            }
        })
    }

    /// Splices this future's eventual outcome directly into `target`, without an
    /// intervening continuation task: fulfilling this future's root cell recursively
    /// fulfills `target` too.
    pub fn forward_to(self, target: Promise<T>) {
        self.forward_to_shared(target.into_shared());
    }

    pub(crate) fn forward_to_shared(self, target: Shared<T>) {
        self.shared.forward_to(target);
    }
}

impl<T> Drop for Future<T> {
    fn drop(&mut self) {
        if self.shared.strong_count() == 1 {
            self.shared.report_if_leaked_exception(&|exception| {
                match crate::scheduler::Reactor::try_current() {
                    Some(reactor) => reactor.report_failed_future(exception),
                    None => tracing::warn!(error = %exception, "exceptional future dropped outside any reactor"),
                }
            });
        }
    }
}

/// Runs `f` (the body of a `finally`), preserving `outcome` as `Ok` on success. If `f`
/// panics and `outcome` was already an exception, the original exception is kept as the
/// `cause` of the new failure, per `spec.md` §4.D/§8's "the new failure is chained with
/// the original as its inner cause". If `outcome` was a value, there is no original
/// exception to preserve, so the panic becomes the sole failure.
fn catch_and_chain<T>(f: impl FnOnce(), outcome: Outcome<T>) -> Result<Outcome<T>, Exception> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(()) => Ok(outcome),
        Err(payload) => {
            let new = Exception::from_panic(payload);
            Err(match outcome {
                Outcome::Value(_) => new,
                Outcome::Exception(original) => {
                    let context = format!("finally block failed after an original exception: {new}");
                    original.chain(context)
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use crate::scheduler::Reactor;

    use super::*;

    fn test_reactor() -> Reactor {
        Reactor::with_defaults(Duration::from_millis(100))
    }

    #[test]
    fn then_runs_inline_when_already_resolved() {
        let reactor = test_reactor();
        reactor.enter(|| {
            let f = ready(1).then(|v| v + 1);
            assert!(f.available());
            assert_eq!(f.get0().unwrap(), 2);
        });
    }

    #[test]
    fn then_runs_after_scheduling_when_pending() {
        let reactor = test_reactor();
        reactor.enter(|| {
            let (promise, future) = channel::<i32>();
            let chained = future.then(move |v| v + 10);
            assert!(!chained.available());

            promise.set_value(5);
            assert!(!chained.available(), "continuation runs as a scheduled task, not inline");

            reactor.run_until_done();
            assert!(chained.available());
            assert_eq!(chained.get0().unwrap(), 15);
        });
    }

    #[test]
    fn exception_short_circuits_then() {
        let reactor = test_reactor();
        reactor.enter(|| {
            let f: Future<i32> = ready_error(Exception::Aborted);
            let mapped = f.then(|v| v + 1);
            assert!(mapped.failed());
            assert!(matches!(mapped.get0(), Err(Exception::Aborted)));
        });
    }

    #[test]
    fn broken_promise_on_drop() {
        let reactor = test_reactor();
        reactor.enter(|| {
            let (promise, future) = channel::<i32>();
            drop(promise);
            assert!(future.failed());
            assert!(matches!(future.get0(), Err(Exception::BrokenPromise)));
        });
    }

    #[test]
    fn finally_runs_on_success_and_failure() {
        let reactor = test_reactor();
        reactor.enter(|| {
            let ran = Rc::new(RefCell::new(0));
            let ran_clone = ran.clone();
            let f = ready(1).finally(move || *ran_clone.borrow_mut() += 1);
            assert_eq!(f.get0().unwrap(), 1);
            assert_eq!(*ran.borrow(), 1);

            let ran2 = Rc::new(RefCell::new(0));
            let ran2_clone = ran2.clone();
            let f2: Future<i32> = ready_error(Exception::Aborted).finally(move || {
                *ran2_clone.borrow_mut() += 1;
            });
            assert!(f2.failed());
            assert_eq!(*ran2.borrow(), 1);
        });
    }

    #[test]
    fn finally_panicking_after_a_failure_chains_the_original_as_the_cause() {
        let reactor = test_reactor();
        reactor.enter(|| {
            let f: Future<i32> = ready_error(Exception::Aborted).finally(|| panic!("cleanup failed"));
            match f.get0() {
                Err(Exception::Chained { cause, .. }) => {
                    assert!(matches!(*cause, Exception::Aborted), "original exception must survive as the cause");
                }
                other => panic!("expected a chained exception, got {other:?}"),
            }
        });
    }

    #[test]
    fn handle_exception_recovers() {
        let reactor = test_reactor();
        reactor.enter(|| {
            let f: Future<i32> = ready_error(Exception::Aborted).handle_exception(|_| 42);
            assert_eq!(f.get0().unwrap(), 42);
        });
    }

    #[test]
    fn forward_to_splices_without_extra_hop() {
        let reactor = test_reactor();
        reactor.enter(|| {
            let (promise, future) = channel::<i32>();
            let (target_promise, target_future) = channel::<i32>();
            future.forward_to(target_promise);
            promise.set_value(9);
            assert!(target_future.available());
            assert_eq!(target_future.get0().unwrap(), 9);
        });
    }

    #[test]
    fn ignore_suppresses_leak_report() {
        let reactor = test_reactor();
        reactor.enter(|| {
            let f: Future<i32> = ready_error(Exception::Aborted);
            f.ignore();
        });
    }
}
