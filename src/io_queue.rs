//! Adapts the fair queue to future/promise-based I/O completions (Component G).
//!
//! Grounded on `original_source/src/core/io_queue.cc`'s `io_desc_read_write` and
//! `queue_request`: a request's `(weight, size)` ticket is computed from its kind and
//! payload length via configured multipliers, the request is admitted through the fair
//! queue, handed to the real submission layer once dispatched, and its promise is
//! fulfilled later when the kernel (or whatever implements [`IoSubmission`]) reports
//! completion. `notify_requests_finished` is called at that point, not at submission
//! time, exactly as the original does it in `complete_with`/`set_exception` rather than
//! in the dispatch loop itself.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::collaborators::{IoDescriptor, IoRequest, IoRequestKind, IoSubmission};
use crate::config::IoQueueConfig;
use crate::error::Exception;
use crate::fair_queue::{ClassId, FairQueue, Ticket};
use crate::future::{channel, Future, Promise};

struct InFlight {
    promise: Promise<usize>,
    ticket: Ticket,
}

/// An I/O queue: a fair queue whose dispatched requests are handed off to a real
/// submission layer, with completions delivered back as resolved futures.
pub struct IoQueue {
    fair: FairQueue,
    read_request_weight: u32,
    write_request_weight: u32,
    read_byte_multiplier: u32,
    write_byte_multiplier: u32,
    submission: Rc<dyn IoSubmission>,
    in_flight: Rc<RefCell<HashMap<u64, InFlight>>>,
    next_descriptor: Rc<RefCell<u64>>,
}

impl IoQueue {
    pub fn new(config: IoQueueConfig, submission: Rc<dyn IoSubmission>) -> Self {
        Self {
            fair: FairQueue::new(config.into(), Box::new(crate::fair_queue::WallClock::default())),
            read_request_weight: config.read_request_weight,
            write_request_weight: config.write_request_weight,
            read_byte_multiplier: config.read_byte_multiplier,
            write_byte_multiplier: config.write_byte_multiplier,
            submission,
            in_flight: Rc::new(RefCell::new(HashMap::new())),
            next_descriptor: Rc::new(RefCell::new(0)),
        }
    }

    pub fn register_priority_class(&mut self, name: impl Into<String>, shares: u32) -> ClassId {
        self.fair.register_priority_class(name, shares)
    }

    /// Computes `request`'s `(weight, size)` ticket from its kind and payload length
    /// via this queue's configured multipliers (`spec.md` §4.G step 1).
    fn ticket_for(&self, request: IoRequest) -> Ticket {
        let len = request.payload_len as u32;
        match request.kind {
            IoRequestKind::Read => Ticket::new(self.read_request_weight, self.read_byte_multiplier * len),
            IoRequestKind::Write => Ticket::new(self.write_request_weight, self.write_byte_multiplier * len),
        }
    }

    /// Queues `request` under `class`. The returned future resolves once
    /// [`IoQueue::complete_with`] is called with the descriptor the request was
    /// admitted under.
    pub fn submit_io(&mut self, class: ClassId, request: IoRequest) -> Future<usize> {
        let (promise, future) = channel();
        let descriptor = {
            let mut next = self.next_descriptor.borrow_mut();
            let d = *next;
            *next += 1;
            IoDescriptor(d)
        };
        let ticket = self.ticket_for(request);

        let in_flight = self.in_flight.clone();
        let submission = self.submission.clone();
        self.fair.queue(
            class,
            ticket,
            Box::new(move || {
                in_flight.borrow_mut().insert(descriptor.0, InFlight { promise, ticket });
                submission.submit(request, descriptor);
            }),
        );

        future
    }

    /// Runs the fair queue's dispatch loop, handing admitted requests off to the
    /// submission layer.
    pub fn dispatch_requests(&mut self) {
        self.fair.dispatch_requests();
    }

    /// Reports that the request submitted under `descriptor` completed successfully
    /// with `result` bytes transferred.
    ///
    /// # Panics
    ///
    /// Panics if `descriptor` does not correspond to a currently in-flight request.
    pub fn complete_with(&mut self, descriptor: IoDescriptor, result: usize) {
        let in_flight = self
            .in_flight
            .borrow_mut()
            .remove(&descriptor.0)
            .expect("complete_with called for an unknown or already-completed descriptor");
        self.fair.notify_requests_finished(in_flight.ticket);
        in_flight.promise.set_value(result);
    }

    /// Reports that the request submitted under `descriptor` failed with `exception`.
    ///
    /// # Panics
    ///
    /// Panics if `descriptor` does not correspond to a currently in-flight request.
    pub fn complete_with_error(&mut self, descriptor: IoDescriptor, exception: Exception) {
        let in_flight = self
            .in_flight
            .borrow_mut()
            .remove(&descriptor.0)
            .expect("complete_with_error called for an unknown or already-completed descriptor");
        self.fair.notify_requests_finished(in_flight.ticket);
        in_flight.promise.set_exception(exception);
    }
}
