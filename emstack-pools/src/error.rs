//! Error types for emstack-pools.

use emstack_core::Axis;
use thiserror::Error;

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pool error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A buffered pool was requested with a zero-width window.
    #[error("window width must be at least 1")]
    InvalidWindowWidth,

    /// A window was built with an even or empty slot list.
    #[error("window requires an odd number of slots, got {0}")]
    InvalidWindowSize(usize),

    /// The scene resolution along the pool's normal axis is unusable.
    #[error("invalid resolution along {axis:?}: {value}")]
    InvalidResolution {
        /// Pool normal axis.
        axis: Axis,
        /// Offending spacing value.
        value: f64,
    },

    /// Scheduler error.
    #[error(transparent)]
    Scheduler(#[from] emstack_scheduler::Error),
}
