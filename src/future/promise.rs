//! The write side of a future/promise pair.

use negative_impl::negative_impl;

use super::state::{Outcome, Shared};
use crate::error::Exception;

/// The write half of a future/promise pair, created together by [`super::channel`].
///
/// Dropping a pending promise without setting a value breaks the paired future: the
/// cell is fulfilled with [`Exception::BrokenPromise`] so that any attached
/// continuation (or a later poll) observes a well-defined failure instead of hanging.
pub struct Promise<T> {
    shared: Shared<T>,
    fulfilled: bool,
}

#[negative_impl]
impl<T> !Send for Promise<T> {}
#[negative_impl]
impl<T> !Sync for Promise<T> {}

impl<T> Promise<T> {
    pub(crate) fn new(shared: Shared<T>) -> Self {
        Self {
            shared,
            fulfilled: false,
        }
    }

    /// Fulfils the paired future with a value.
    ///
    /// # Panics
    ///
    /// Panics if this promise (or its paired future, via `forward_to`) has already been
    /// fulfilled.
    pub fn set_value(mut self, value: T) {
        self.shared.fulfil(Outcome::Value(value));
        self.fulfilled = true;
    }

    /// Fulfils the paired future with an exception.
    ///
    /// # Panics
    ///
    /// Panics if this promise has already been fulfilled.
    pub fn set_exception(mut self, exception: Exception) {
        self.shared.fulfil(Outcome::Exception(exception));
        self.fulfilled = true;
    }

    /// Hands responsibility for fulfilling this promise's shared cell to the caller,
    /// who is expected to splice another future's outcome into it directly (see
    /// `Future::forward_to`). Suppresses the broken-promise-on-drop logic since the
    /// cell itself now tracks its own redirection.
    pub(crate) fn into_shared(mut self) -> Shared<T> {
        self.fulfilled = true;
        self.shared.clone()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.fulfilled {
            self.shared.fulfil(Outcome::Exception(Exception::BrokenPromise));
        }
    }
}
