//! emstack-scheduler: Prioritized background task scheduler.
//!
//! Worker threads draw tasks from a shared priority queue. Tasks are
//! persistent objects that may be submitted many times: resubmitting a
//! task that is already running marks it for restart, and resubmitting a
//! queued task refreshes its queue position (picking up a priority
//! change). At most one queued entry and one running instance exist per
//! task at any time.

pub mod error;
pub mod scheduler;
pub mod task;

pub use error::{Error, Result};
pub use scheduler::Scheduler;
pub use task::{Priority, Task, TaskId, TaskRef};
