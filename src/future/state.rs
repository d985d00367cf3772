//! The shared state cell backing a `Promise`/`Future` pair.
//!
//! Grounded on `oxidizer_rt::once_event::isolated`: a single-threaded, `Rc`-shared cell
//! with a small tagged-union state machine. Unlike that module (which is poll-based and
//! services exactly one `Future::poll` call), this cell also supports attaching a
//! continuation waiter that is invoked synchronously once, and a `Forward` state used to
//! splice one future's completion directly into another without an intervening task.

use std::cell::RefCell;
use std::rc::Rc;

use negative_impl::negative_impl;

use crate::error::Exception;

/// The result of a completed future: either a value or an exception.
#[derive(Debug)]
pub enum Outcome<T> {
    Value(T),
    Exception(Exception),
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Value(v) => Outcome::Value(f(v)),
            Outcome::Exception(e) => Outcome::Exception(e),
        }
    }
}

/// What happens when a cell transitions out of `Pending`.
pub(crate) enum Waiter<T> {
    /// A continuation closure to invoke with the outcome, once, synchronously.
    Continuation(Box<dyn FnOnce(Outcome<T>)>),
    /// Redirect the outcome into another cell's root, as if it had completed there
    /// directly (used by `forward_to`/splice; never schedules an intermediate task).
    Forward(Shared<T>),
}

pub(crate) enum Cell<T> {
    /// No outcome yet. May have a waiter attached.
    Pending(Option<Waiter<T>>),
    /// A value was produced and has not yet been read.
    Value(T),
    /// An exception was produced and has not yet been inspected.
    Exception(Exception),
    /// The outcome (value or exception) was read exactly once and discarded.
    Consumed,
}

/// A reference-counted handle to a `Cell`, shared between a `Promise`, a `Future`, and
/// (transiently) a `Continuation`.
///
/// There is exactly one promise and one future created per `channel()` call, so
/// "exactly one owner reads the outcome" is enforced by construction rather than by a
/// three-way ownership dance: both handles share the same `Rc<RefCell<Cell<T>>>` and the
/// cell's own state machine (not the number of live handles) is what prevents a value
/// from being read twice.
pub(crate) struct Shared<T>(Rc<RefCell<Cell<T>>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

#[negative_impl]
impl<T> !Send for Shared<T> {}
#[negative_impl]
impl<T> !Sync for Shared<T> {}

impl<T> Shared<T> {
    pub(crate) fn new_pending() -> Self {
        Self(Rc::new(RefCell::new(Cell::Pending(None))))
    }

    pub(crate) fn new_ready(outcome: Outcome<T>) -> Self {
        let cell = match outcome {
            Outcome::Value(v) => Cell::Value(v),
            Outcome::Exception(e) => Cell::Exception(e),
        };
        Self(Rc::new(RefCell::new(cell)))
    }

    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Walks any `Forward` redirections to find the cell that actually owns the state,
    /// compressing the chain as it goes so repeated forwards don't pile up.
    fn root(&self) -> Self {
        let next = {
            let borrowed = self.0.borrow();
            match &*borrowed {
                Cell::Pending(Some(Waiter::Forward(target))) => Some(target.clone()),
                _ => None,
            }
        };
        match next {
            Some(target) => {
                let resolved = target.root();
                *self.0.borrow_mut() = Cell::Pending(Some(Waiter::Forward(resolved.clone())));
                resolved
            }
            None => self.clone(),
        }
    }

    /// Fulfils the root cell with a value, waking any attached waiter.
    pub(crate) fn fulfil(&self, outcome: Outcome<T>) {
        let root = self.root();
        let waiter = {
            let mut borrowed = root.0.borrow_mut();
            match &mut *borrowed {
                Cell::Pending(slot) => slot.take(),
                _ => panic!("future state fulfilled twice"),
            }
        };

        match waiter {
            None => {
                *root.0.borrow_mut() = match outcome {
                    Outcome::Value(v) => Cell::Value(v),
                    Outcome::Exception(e) => Cell::Exception(e),
                };
            }
            Some(Waiter::Continuation(f)) => {
                *root.0.borrow_mut() = Cell::Consumed;
                f(outcome);
            }
            Some(Waiter::Forward(target)) => {
                *root.0.borrow_mut() = Cell::Consumed;
                target.fulfil(outcome);
            }
        }
    }

    /// Attaches a waiter to the root cell. Panics if a waiter is already attached, or if
    /// the cell is already resolved and unread (that case should instead be serviced
    /// synchronously by the caller without ever reaching this method).
    pub(crate) fn attach(&self, waiter: Waiter<T>) {
        let root = self.root();
        let mut borrowed = root.0.borrow_mut();
        match &mut *borrowed {
            Cell::Pending(slot @ None) => *slot = Some(waiter),
            Cell::Pending(Some(_)) => {
                panic!("a second continuation was attached to the same future")
            }
            Cell::Value(_) | Cell::Exception(_) | Cell::Consumed => {
                panic!("attach called on an already-resolved cell; take_outcome first")
            }
        }
    }

    /// True once the root cell holds a value or exception that hasn't been consumed.
    pub(crate) fn is_available(&self) -> bool {
        matches!(
            &*self.root().0.borrow(),
            Cell::Value(_) | Cell::Exception(_)
        )
    }

    pub(crate) fn is_failed(&self) -> bool {
        matches!(&*self.root().0.borrow(), Cell::Exception(_))
    }

    /// Takes the outcome out of an available root cell, marking it consumed.
    ///
    /// # Panics
    ///
    /// Panics if the cell is still pending, or was already consumed.
    pub(crate) fn take_outcome(&self) -> Outcome<T> {
        let root = self.root();
        let mut borrowed = root.0.borrow_mut();
        match std::mem::replace(&mut *borrowed, Cell::Consumed) {
            Cell::Value(v) => Outcome::Value(v),
            Cell::Exception(e) => Outcome::Exception(e),
            Cell::Pending(slot) => {
                *borrowed = Cell::Pending(slot);
                panic!("take_outcome called on a pending future")
            }
            Cell::Consumed => panic!("take_outcome called on an already-consumed future"),
        }
    }

    /// Discards an available outcome without reporting a leaked exception.
    pub(crate) fn ignore(&self) {
        let root = self.root();
        let mut borrowed = root.0.borrow_mut();
        if matches!(&*borrowed, Cell::Value(_) | Cell::Exception(_)) {
            *borrowed = Cell::Consumed;
        }
    }

    /// Redirects this cell's eventual outcome into `target` directly, splicing the two
    /// chains without an intermediate continuation task. If this cell is already
    /// resolved, the outcome is written straight through to `target` now.
    pub(crate) fn forward_to(&self, target: Shared<T>) {
        let root = self.root();
        let took = {
            let mut borrowed = root.0.borrow_mut();
            match &mut *borrowed {
                Cell::Pending(slot @ None) => {
                    *slot = Some(Waiter::Forward(target.clone()));
                    None
                }
                Cell::Pending(Some(_)) => {
                    panic!("a continuation is already attached to this future")
                }
                Cell::Value(_) | Cell::Exception(_) => {
                    Some(std::mem::replace(&mut *borrowed, Cell::Consumed))
                }
                Cell::Consumed => panic!("forward_to called on an already-consumed future"),
            }
        };

        if let Some(resolved) = took {
            let outcome = match resolved {
                Cell::Value(v) => Outcome::Value(v),
                Cell::Exception(e) => Outcome::Exception(e),
                _ => unreachable!(),
            };
            target.fulfil(outcome);
        }
    }

    /// Reports (and consumes) a leaked, never-inspected exception to `sink`, if the
    /// root cell currently holds one. Used from `Future::drop`.
    pub(crate) fn report_if_leaked_exception(&self, sink: &dyn Fn(&Exception)) {
        let root = self.root();
        let mut borrowed = root.0.borrow_mut();
        if matches!(&*borrowed, Cell::Exception(_)) {
            if let Cell::Exception(e) = &*borrowed {
                sink(e);
            }
            *borrowed = Cell::Consumed;
        }
    }
}
