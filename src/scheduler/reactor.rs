//! The cooperative, single-threaded run loop.
//!
//! A `Reactor` owns one shard's ready queue and drives it to quiescence. Continuations
//! scheduled while a reactor is entered are pushed onto *that* reactor's queue via the
//! ambient, thread-local "current reactor" handle, mirroring Seastar's thread-local
//! `engine()` singleton rather than threading an executor handle through every
//! combinator call, which would be unworkable given how `Future`/`Promise` are
//! constructed throughout this crate.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use negative_impl::negative_impl;

use crate::collaborators::{FailedFutureSink, Poller, Preempt, Schedule};
use crate::task::{Task, Urgency};

use super::queue::ReadyQueue;

thread_local! {
    static CURRENT: RefCell<Option<Reactor>> = const { RefCell::new(None) };
}

struct Inner {
    queue: ReadyQueue,
    pollers: Vec<Box<dyn Poller>>,
    preempt: Box<dyn Preempt>,
    sink: Box<dyn FailedFutureSink>,
    /// Set by [`Reactor::engine_exit`]. `Some(code)` once shutdown has been requested;
    /// `run_until_done` stops consulting pollers and exits as soon as the ready queue
    /// drains, rather than waiting for the shard to go fully idle.
    shutdown: Option<i32>,
}

/// A cheaply-cloneable handle to one shard's scheduler.
///
/// Cloning a `Reactor` does not create a second shard; all clones share the same
/// underlying queue. The type is `!Send`/`!Sync` because the queue it guards is only
/// ever touched from the owning OS thread.
#[derive(Clone)]
pub struct Reactor {
    inner: Rc<RefCell<Inner>>,
}

#[negative_impl]
impl !Send for Reactor {}
#[negative_impl]
impl !Sync for Reactor {}

/// Wall-clock-based [`Preempt`] implementation: preempts once `task_quota` has elapsed
/// since the last `reset()`.
pub struct WallClockPreempt {
    task_quota: Duration,
    started_at: RefCell<Instant>,
}

impl WallClockPreempt {
    pub fn new(task_quota: Duration) -> Self {
        Self {
            task_quota,
            started_at: RefCell::new(Instant::now()),
        }
    }
}

impl Preempt for WallClockPreempt {
    fn need_preempt(&self) -> bool {
        self.started_at.borrow().elapsed() >= self.task_quota
    }

    fn reset(&self) {
        *self.started_at.borrow_mut() = Instant::now();
    }
}

/// A [`FailedFutureSink`] that emits a `tracing::warn!` event for every leaked
/// exception, matching `oxidizer_rt`'s use of `tracing` for comparable lifecycle
/// diagnostics.
pub struct TracingFailedFutureSink;

impl FailedFutureSink for TracingFailedFutureSink {
    fn report_failed_future(&self, exception: &crate::error::Exception) {
        tracing::warn!(error = %exception, "exceptional future ignored");
    }
}

impl Reactor {
    /// Builds a new reactor. Does not install it as the current thread's reactor; call
    /// [`Reactor::enter`] (directly, or implicitly via [`Reactor::run_until_done`]) to do
    /// that.
    pub fn new(preempt: Box<dyn Preempt>, sink: Box<dyn FailedFutureSink>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                queue: ReadyQueue::new(),
                pollers: Vec::new(),
                preempt,
                sink,
                shutdown: None,
            })),
        }
    }

    /// Convenience constructor using [`WallClockPreempt`] and [`TracingFailedFutureSink`].
    pub fn with_defaults(task_quota: Duration) -> Self {
        Self::new(
            Box::new(WallClockPreempt::new(task_quota)),
            Box::new(TracingFailedFutureSink),
        )
    }

    pub fn add_poller(&self, poller: Box<dyn Poller>) {
        self.inner.borrow_mut().pollers.push(poller);
    }

    /// Returns the reactor entered on the current thread, if any.
    ///
    /// # Panics
    ///
    /// Panics if no reactor is currently entered. Future combinators call this from
    /// inside a continuation or while attaching one, both of which only ever happen
    /// while some reactor is running.
    pub(crate) fn current() -> Reactor {
        Self::try_current().expect("no reactor is entered on this thread")
    }

    /// Like [`Reactor::current`], but returns `None` instead of panicking when no
    /// reactor is entered (used by places that must behave gracefully even when run
    /// outside any reactor, such as `Future::drop`).
    pub(crate) fn try_current() -> Option<Reactor> {
        CURRENT.with(|cell| cell.borrow().clone())
    }

    pub(crate) fn report_failed_future(&self, exception: &crate::error::Exception) {
        self.inner.borrow().sink.report_failed_future(exception);
    }

    /// Whether the current scheduler cycle has exhausted its preemption budget, used
    /// by future combinators to decide between the inline fast path and scheduling.
    pub(crate) fn need_preempt(&self) -> bool {
        self.inner.borrow().preempt.need_preempt()
    }

    /// Installs this reactor as the current thread's reactor for the duration of `f`.
    ///
    /// Reentering the reactor that is already current (e.g. calling
    /// [`Reactor::run_until_done`] from within code that already entered the same
    /// reactor to build and submit work) is a no-op wrapper, not an error.
    ///
    /// # Panics
    ///
    /// Panics if a *different* reactor is already entered on this thread: exactly one
    /// reactor may be active per OS thread at a time, mirroring Seastar's
    /// one-engine-per-thread assumption.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let already_current = CURRENT.with(|cell| match &*cell.borrow() {
            Some(current) => Rc::ptr_eq(&current.inner, &self.inner),
            None => false,
        });
        if already_current {
            return f();
        }

        let previous = CURRENT.with(|cell| cell.borrow_mut().replace(self.clone()));
        assert!(previous.is_none(), "a different reactor is already entered on this thread");
        let result = f();
        CURRENT.with(|cell| *cell.borrow_mut() = previous);
        result
    }

    /// Runs one scheduling cycle: resets the preemption budget, polls every registered
    /// poller once, then drains the ready queue until it is empty or preemption is
    /// requested. Returns `true` if any work was done.
    fn run_cycle(&self) -> bool {
        let mut did_work = false;

        self.inner.borrow().preempt.reset();

        let poller_count = self.inner.borrow().pollers.len();
        for index in 0..poller_count {
            let polled = {
                let mut inner = self.inner.borrow_mut();
                inner.pollers[index].poll()
            };
            did_work |= polled;
        }

        loop {
            if self.inner.borrow().preempt.need_preempt() {
                break;
            }
            let task = self.inner.borrow_mut().queue.pop();
            match task {
                Some(task) => {
                    did_work = true;
                    task.run_and_dispose();
                }
                None => break,
            }
        }

        did_work
    }

    pub(crate) fn has_ready_work(&self) -> bool {
        !self.inner.borrow().queue.is_empty()
    }

    pub(crate) fn ready_len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Sets the shutdown flag with the given exit code.
    ///
    /// Grounded on `oxidizer_rt::executor::AsyncTaskExecutor`'s `shutdown_started` flag,
    /// adapted to this crate's run-to-quiescence loop: rather than wait for pollers to
    /// go quiet, [`Reactor::run_until_done`] drains whatever is already queued and
    /// returns as soon as that drains, recording `code` for [`Reactor::exit_code`].
    pub fn engine_exit(&self, code: i32) {
        self.inner.borrow_mut().shutdown = Some(code);
    }

    /// The code passed to [`Reactor::engine_exit`], if shutdown has been requested.
    pub fn exit_code(&self) -> Option<i32> {
        self.inner.borrow().shutdown
    }

    /// Enters this reactor and runs cycles until the queue is empty and every poller
    /// reports no work (i.e. the shard is idle), or until `engine_exit` has been called
    /// and the ready queue has drained.
    pub fn run_until_done(&self) {
        self.enter(|| loop {
            let did_work = self.run_cycle();
            let queue_empty = self.inner.borrow().queue.is_empty();
            let shutting_down = self.inner.borrow().shutdown.is_some();
            if queue_empty && (shutting_down || !did_work) {
                break;
            }
        });
    }
}

impl Schedule for Reactor {
    fn schedule(&self, task: Box<dyn Task>, urgency: Urgency) {
        self.inner.borrow_mut().queue.push(task, urgency);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct AlwaysPreempt;
    impl Preempt for AlwaysPreempt {
        fn need_preempt(&self) -> bool {
            true
        }
    }

    struct NeverPreempt;
    impl Preempt for NeverPreempt {
        fn need_preempt(&self) -> bool {
            false
        }
    }

    struct NoopSink;
    impl FailedFutureSink for NoopSink {
        fn report_failed_future(&self, _exception: &crate::error::Exception) {}
    }

    struct Counting(Rc<Cell<u32>>);
    impl Task for Counting {
        fn run_and_dispose(self: Box<Self>) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn drains_queue_to_completion_when_never_preempted() {
        let reactor = Reactor::new(Box::new(NeverPreempt), Box::new(NoopSink));
        let count = Rc::new(Cell::new(0));
        for _ in 0..5 {
            reactor.schedule(Box::new(Counting(count.clone())), Urgency::Normal);
        }
        reactor.run_until_done();
        assert_eq!(count.get(), 5);
    }

    #[test]
    fn one_cycle_runs_nothing_when_preempt_is_immediate() {
        let reactor = Reactor::new(Box::new(AlwaysPreempt), Box::new(NoopSink));
        let count = Rc::new(Cell::new(0));
        reactor.schedule(Box::new(Counting(count.clone())), Urgency::Normal);
        assert!(!reactor.run_cycle());
        assert_eq!(count.get(), 0);
        assert!(reactor.has_ready_work());
    }

    #[test]
    fn reentering_the_same_reactor_is_a_no_op() {
        let reactor = Reactor::new(Box::new(NeverPreempt), Box::new(NoopSink));
        let ran = reactor.enter(|| reactor.enter(|| 42));
        assert_eq!(ran, 42);
    }

    #[test]
    #[should_panic(expected = "a different reactor is already entered")]
    fn entering_a_different_reactor_while_one_is_active_panics() {
        let first = Reactor::new(Box::new(NeverPreempt), Box::new(NoopSink));
        let second = Reactor::new(Box::new(NeverPreempt), Box::new(NoopSink));
        first.enter(|| {
            second.enter(|| {});
        });
    }

    #[test]
    #[should_panic(expected = "no reactor is entered")]
    fn current_without_entered_reactor_panics() {
        CURRENT.with(|cell| *cell.borrow_mut() = None);
        let _ = Reactor::current();
    }

    #[test]
    fn engine_exit_drains_the_queue_and_records_the_exit_code() {
        let reactor = Reactor::new(Box::new(NeverPreempt), Box::new(NoopSink));
        let count = Rc::new(Cell::new(0));
        for _ in 0..3 {
            reactor.schedule(Box::new(Counting(count.clone())), Urgency::Normal);
        }

        assert_eq!(reactor.exit_code(), None);
        reactor.engine_exit(7);
        reactor.run_until_done();

        assert_eq!(count.get(), 3, "queued work still drains after shutdown is requested");
        assert_eq!(reactor.exit_code(), Some(7));
    }
}
