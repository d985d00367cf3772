//! A single class of requests competing for a fair queue's capacity.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use negative_impl::negative_impl;

use super::ticket::Ticket;

/// Identifies a priority class registered with a [`super::FairQueue`].
///
/// Ids are reserved from a single process-wide counter and interned against a name in a
/// process-wide table, per `spec.md` §3's glossary ("Ids are globally reserved once and
/// name-interned") and §9's Design Notes ("process-wide tables initialised once... not
/// mutated after registration except via `update_shares` and `rename`"). An id is never
/// reused and keeps its name even after the `FairQueue` that issued it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub(crate) u64);

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(0);

fn name_registry() -> &'static Mutex<HashMap<ClassId, String>> {
    static REGISTRY: OnceLock<Mutex<HashMap<ClassId, String>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

impl ClassId {
    pub(crate) fn reserve(name: String) -> Self {
        let id = Self(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed));
        name_registry().lock().unwrap().insert(id, name);
        id
    }

    /// Returns this class's interned name.
    ///
    /// # Panics
    ///
    /// Panics if this id was never reserved via [`super::FairQueue::register_priority_class`].
    pub fn name(self) -> String {
        name_registry().lock().unwrap().get(&self).cloned().expect("unknown class id")
    }

    /// Updates this class's interned name in place, without reserving a new id.
    pub fn rename(self, name: impl Into<String>) {
        name_registry().lock().unwrap().insert(self, name.into());
    }
}

pub(crate) struct Request {
    pub(crate) ticket: Ticket,
    pub(crate) body: Box<dyn FnOnce()>,
}

pub(crate) struct PriorityClass {
    pub(crate) shares: u32,
    pub(crate) accumulated: f64,
    pub(crate) queue: VecDeque<Request>,
    /// Whether this class currently has a handle sitting in the dispatch heap. Tracked
    /// here (rather than inferred from heap membership) because a `BinaryHeap` cannot
    /// be queried by key, mirroring the original's `_queued` flag on `priority_class`.
    pub(crate) queued: bool,
}

#[negative_impl]
impl !Send for PriorityClass {}
#[negative_impl]
impl !Sync for PriorityClass {}

impl PriorityClass {
    pub(crate) fn new(shares: u32) -> Self {
        Self {
            shares: shares.max(1),
            accumulated: 0.0,
            queue: VecDeque::new(),
            queued: false,
        }
    }

    pub(crate) fn update_shares(&mut self, shares: u32) {
        self.shares = shares.max(1);
    }
}

/// A heap entry ordering priority classes by ascending `accumulated` (lowest virtual
/// time dispatches first), the Rust equivalent of the C++ `priority_queue` comparator
/// over `priority_class::_accumulated` with a `std::priority_queue` that is only ever
/// compared, never iterated.
#[derive(PartialEq)]
pub(crate) struct HeapEntry {
    pub(crate) class: ClassId,
    pub(crate) accumulated: f64,
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so that `BinaryHeap` (a max-heap) pops the *lowest* accumulated
        // value first.
        other.accumulated.total_cmp(&self.accumulated)
    }
}
