//! Completion and progress events.
//!
//! Updaters report to their pool over a channel the pool owns; the pool
//! forwards a filtered view to the render layer. Both channels are
//! drained by the UI thread, typically once per render tick.

use emstack_core::{Actors, FrameRef};
use emstack_scheduler::TaskId;

/// Event sent by an updater to its owning pool.
#[derive(Clone)]
pub enum UpdaterEvent {
    /// A run completed and published a consistent actor set.
    ActorsReady {
        /// Reporting updater.
        updater: TaskId,
        /// Frame the actors belong to.
        frame: FrameRef,
        /// Snapshot of the computed actors.
        actors: Actors,
    },
    /// Fractional progress of an in-flight run.
    Progress {
        /// Reporting updater.
        updater: TaskId,
        /// Updater description at report time.
        description: String,
        /// Completed fraction in `0.0..=1.0`.
        fraction: f32,
    },
}

/// Event surfaced by a pool to the render/view layer.
#[derive(Clone)]
pub enum PoolEvent {
    /// A newer consistent actor set is available for compositing.
    ActorsReady {
        /// Frame the actors belong to.
        frame: FrameRef,
        /// Actors to swap in.
        actors: Actors,
    },
    /// All buffered representations were invalidated; new ones are being
    /// computed for the given frame.
    ActorsInvalidated {
        /// Frame that triggered the invalidation.
        frame: FrameRef,
    },
    /// Fractional progress of background actor computation.
    Progress {
        /// Task description.
        description: String,
        /// Completed fraction in `0.0..=1.0`.
        fraction: f32,
    },
}
