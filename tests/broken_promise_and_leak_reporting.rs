//! Integration test: a promise dropped without being set breaks its future with
//! `Exception::BrokenPromise`, and a future dropped while still holding an uninspected
//! exception is reported to the reactor's `FailedFutureSink` collaborator rather than
//! silently discarded.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use shard_core::collaborators::FailedFutureSink;
use shard_core::error::Exception;
use shard_core::scheduler::{Reactor, WallClockPreempt};
use shard_core::{channel, ready_error, Future};

struct RecordingSink {
    seen: Rc<RefCell<Vec<String>>>,
}

impl FailedFutureSink for RecordingSink {
    fn report_failed_future(&self, exception: &Exception) {
        self.seen.borrow_mut().push(exception.to_string());
    }
}

#[test]
fn dropping_a_promise_breaks_its_future() {
    let reactor = Reactor::with_defaults(Duration::from_millis(50));
    reactor.enter(|| {
        let (promise, future) = channel::<i32>();
        drop(promise);
        assert!(future.failed());
        assert!(matches!(future.get0(), Err(Exception::BrokenPromise)));
    });
}

#[test]
fn an_uninspected_failed_future_is_reported_to_the_sink_on_drop() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let reactor = Reactor::new(
        Box::new(WallClockPreempt::new(Duration::from_millis(50))),
        Box::new(RecordingSink { seen: seen.clone() }),
    );
    reactor.enter(|| {
        let leaked: Future<i32> = ready_error(Exception::Aborted);
        drop(leaked);
    });
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0], "task aborted");
}

#[test]
fn calling_ignore_suppresses_the_leak_report() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let reactor = Reactor::new(
        Box::new(WallClockPreempt::new(Duration::from_millis(50))),
        Box::new(RecordingSink { seen: seen.clone() }),
    );
    reactor.enter(|| {
        let handled: Future<i32> = ready_error(Exception::Aborted);
        handled.ignore();
    });
    assert!(seen.borrow().is_empty());
}

#[test]
fn a_future_whose_value_was_read_is_not_reported_even_if_it_failed() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let reactor = Reactor::new(
        Box::new(WallClockPreempt::new(Duration::from_millis(50))),
        Box::new(RecordingSink { seen: seen.clone() }),
    );
    reactor.enter(|| {
        let inspected: Future<i32> = ready_error(Exception::Aborted);
        let _ = inspected.get0();
    });
    assert!(seen.borrow().is_empty());
}
