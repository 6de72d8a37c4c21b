//! Error types for emstack-scheduler.

use thiserror::Error;

/// Result type alias for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Scheduler error types.
#[derive(Error, Debug)]
pub enum Error {
    /// The scheduler has been shut down and accepts no more tasks.
    #[error("scheduler is shut down")]
    Shutdown,

    /// The scheduler was created with no worker threads.
    #[error("scheduler requires at least one worker thread")]
    NoWorkers,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
