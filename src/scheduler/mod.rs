//! The cooperative scheduler (Component E).

mod queue;
mod reactor;

pub use reactor::{Reactor, TracingFailedFutureSink, WallClockPreempt};
