//! Task trait and scheduling priorities.

use std::sync::Arc;

/// Identity of a task, unique per scheduler.
pub type TaskId = u64;

/// Scheduling priority. Higher variants are dispatched first; within a
/// priority tasks run in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    /// Background housekeeping.
    VeryLow = 0,
    /// Prefetch work far from the current view.
    Low = 1,
    /// Default priority.
    Normal = 2,
    /// Work near the current view.
    High = 3,
    /// Work for the current view itself.
    VeryHigh = 4,
}

impl Priority {
    /// Returns the priority as its numeric rank.
    #[inline]
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Builds a priority from its numeric rank, clamping unknown ranks
    /// to [`Priority::Normal`].
    #[inline]
    #[must_use]
    pub fn from_u8(rank: u8) -> Self {
        match rank {
            0 => Priority::VeryLow,
            1 => Priority::Low,
            3 => Priority::High,
            4 => Priority::VeryHigh,
            _ => Priority::Normal,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// A unit of background work.
///
/// Implementations own their cancellation and restart state; the
/// scheduler only decides when `run` is called. `priority` is read at
/// dispatch time, so a priority raised while the task waits in the queue
/// takes effect before it runs.
pub trait Task: Send + Sync {
    /// Identity of this task. Obtain one from
    /// [`Scheduler::next_task_id`](crate::Scheduler::next_task_id).
    fn id(&self) -> TaskId;

    /// Human readable description for logs.
    fn description(&self) -> String;

    /// Current scheduling priority.
    fn priority(&self) -> Priority;

    /// Executes the task body on a worker thread.
    fn run(&self);
}

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_order_by_rank() {
        assert!(Priority::VeryHigh > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert!(Priority::Low > Priority::VeryLow);
    }

    #[test]
    fn rank_round_trips() {
        for p in [
            Priority::VeryLow,
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::VeryHigh,
        ] {
            assert_eq!(Priority::from_u8(p.as_u8()), p);
        }
        assert_eq!(Priority::from_u8(200), Priority::Normal);
    }
}
