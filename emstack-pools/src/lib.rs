//! emstack-pools: Buffered, prioritized representation pools.
//!
//! This crate is the concurrency core of emstack. A pool translates
//! crosshair navigation and display setting changes into a minimal set of
//! background updater tasks, keeps a circular window of precomputed
//! neighboring slices, and republishes only the newest consistent actor
//! set to the render layer:
//!
//! - [`RepresentationUpdater`] computes actors for one slice context.
//! - [`RepresentationWindow`] is the circular buffer of updaters around
//!   the current slice, with minimal invalidation on shifts.
//! - [`BufferedRepresentationPool`] pages through slices with warm
//!   caches; [`BasicRepresentationPool`] recomputes a single context.
//!
//! Completion flows over channels, not callbacks: updaters feed their
//! pool, the pool feeds the render layer through [`PoolEvent`]s drained
//! on the UI tick.

pub mod basic;
pub mod buffered;
pub mod error;
pub mod event;
pub mod pool;
pub mod ranged;
pub mod updater;
pub mod window;

pub use basic::BasicRepresentationPool;
pub use buffered::BufferedRepresentationPool;
pub use error::{Error, Result};
pub use event::{PoolEvent, UpdaterEvent};
pub use pool::RepresentationPool;
pub use ranged::RangedValue;
pub use updater::{settings_crosshair, RepresentationUpdater, UpdateMode, CROSSHAIR_TAG};
pub use window::{Cursor, RepresentationWindow};

#[cfg(test)]
pub(crate) mod testing;
