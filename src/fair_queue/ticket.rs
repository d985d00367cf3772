//! The two-dimensional resource cost unit dispatched requests are weighed against.
//!
//! Grounded directly on `original_source/src/core/fair_queue.cc`'s `fair_queue_ticket`;
//! there is no Rust precedent for this in the example pack.

use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A request's cost along two independent axes: a count (`weight`, e.g. "one request")
/// and a size (`size`, e.g. bytes). Dispatch capacity is tracked in the same two axes so
/// neither a flood of tiny requests nor a few huge ones can starve the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ticket {
    weight: u32,
    size: u32,
}

impl Ticket {
    pub fn new(weight: u32, size: u32) -> Self {
        Self { weight, size }
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Normalizes this ticket's cost against `denominator` (typically the queue's
    /// maximum capacity), producing the dimensionless cost used in the virtual-time
    /// accumulator.
    pub fn normalize(&self, denominator: Ticket) -> f64 {
        f64::from(self.weight) / f64::from(denominator.weight)
            + f64::from(self.size) / f64::from(denominator.size)
    }

    /// True only if this ticket is strictly below `rhs` on *both* axes, matching the
    /// original's deliberately conservative `operator<` (used for capacity admission,
    /// not for a total order).
    pub fn strictly_below(&self, rhs: Ticket) -> bool {
        self.weight < rhs.weight && self.size < rhs.size
    }

    /// True if this ticket has any nonzero cost at all.
    pub fn is_nonzero(&self) -> bool {
        self.weight > 0 || self.size > 0
    }
}

impl Add for Ticket {
    type Output = Ticket;
    fn add(self, rhs: Ticket) -> Ticket {
        Ticket::new(self.weight + rhs.weight, self.size + rhs.size)
    }
}

impl AddAssign for Ticket {
    fn add_assign(&mut self, rhs: Ticket) {
        self.weight += rhs.weight;
        self.size += rhs.size;
    }
}

impl Sub for Ticket {
    type Output = Ticket;
    fn sub(self, rhs: Ticket) -> Ticket {
        Ticket::new(self.weight - rhs.weight, self.size - rhs.size)
    }
}

impl SubAssign for Ticket {
    fn sub_assign(&mut self, rhs: Ticket) {
        self.weight -= rhs.weight;
        self.size -= rhs.size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_sums_both_axes() {
        let ticket = Ticket::new(1, 100);
        let capacity = Ticket::new(10, 1000);
        assert!((ticket.normalize(capacity) - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn strictly_below_requires_both_axes() {
        assert!(Ticket::new(1, 1).strictly_below(Ticket::new(2, 2)));
        assert!(!Ticket::new(1, 3).strictly_below(Ticket::new(2, 2)));
    }

    #[test]
    fn arithmetic_round_trips() {
        let mut t = Ticket::new(1, 1);
        t += Ticket::new(2, 3);
        assert_eq!(t, Ticket::new(3, 4));
        t -= Ticket::new(1, 1);
        assert_eq!(t, Ticket::new(2, 3));
    }
}
