//! Property test: across a range of share configurations, the class with more shares
//! is never dispatched less often than the class with fewer shares, over a long run of
//! steadily-produced single-unit requests contending for a single-admission capacity
//! envelope.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;

use shard_core::fair_queue::{Clock, Config, FairQueue, Ticket};

struct FakeClock(Cell<u64>);

impl Clock for FakeClock {
    fn now_micros(&self) -> u64 {
        self.0.get()
    }
}

/// Runs `rounds` dispatch cycles. Each round queues one fresh request for each class,
/// then frees the previous round's single unit of capacity before dispatching again,
/// so exactly one request drains per round and the backlog never fully empties,
/// keeping both classes in genuine contention for the whole run.
fn run_rounds(shares_a: u32, shares_b: u32, rounds: u32) -> (u32, u32) {
    let mut queue = FairQueue::new(
        Config {
            max_requests: 1,
            max_bytes: 1,
            tau_micros: 1_000_000_000.0,
        },
        Box::new(FakeClock(Cell::new(0))),
    );
    let a = queue.register_priority_class("a", shares_a);
    let b = queue.register_priority_class("b", shares_b);

    let counts = Rc::new(RefCell::new((0u32, 0u32)));

    for i in 0..rounds {
        for (class, is_a) in [(a, true), (b, false)] {
            let counts = counts.clone();
            queue.queue(
                class,
                Ticket::new(1, 1),
                Box::new(move || {
                    let mut counts = counts.borrow_mut();
                    if is_a {
                        counts.0 += 1;
                    } else {
                        counts.1 += 1;
                    }
                }),
            );
        }
        if i > 0 {
            queue.notify_requests_finished(Ticket::new(1, 1));
        }
        queue.dispatch_requests();
    }

    *counts.borrow()
}

proptest! {
    #[test]
    fn higher_shares_dispatch_at_least_as_often(
        shares_a in 150u32..500,
        shares_b in 10u32..100,
    ) {
        let (a_count, b_count) = run_rounds(shares_a, shares_b, 400);
        prop_assert!(a_count >= b_count);
        prop_assert_eq!(a_count + b_count, 400);
    }
}
