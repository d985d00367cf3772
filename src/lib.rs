//! A single-shard, share-nothing cooperative execution substrate.
//!
//! This crate provides the core of a Seastar-shaped async runtime for one shard
//! (one OS thread, one private reactor, no locks): continuation-based futures and
//! promises, a two-priority cooperative scheduler, and a multi-class fair queue for
//! admitting I/O and other scarce-resource requests. Cross-shard messaging, the
//! kernel I/O poller, CLI/configuration parsing, and topology discovery are all
//! external collaborators this crate only defines contracts for (see
//! [`collaborators`]).

pub mod collaborators;
pub mod config;
pub mod error;
pub mod fair_queue;
pub mod future;
pub mod io_queue;
pub mod scheduler;
pub mod task;

pub use error::{Error, Exception, Result};
pub use future::{channel, ready, ready_error, Future, Outcome, Promise};
pub use scheduler::Reactor;
pub use task::{Task, Urgency};
