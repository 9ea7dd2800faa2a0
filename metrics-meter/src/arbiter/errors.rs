use std::io;

use thiserror::Error as ThisError;

/// Errors that could occur while configuring or starting an [`Arbiter`](crate::Arbiter).
#[derive(Debug, ThisError)]
pub enum ArbiterError {
    /// The tick interval was zero.
    #[error("tick interval cannot be zero")]
    ZeroTickInterval,

    /// The arbiter is driven manually, and has no ticking thread to start.
    #[error("arbiter is driven manually and has no ticking thread")]
    ManuallyDriven,

    /// Spawning the ticking thread did not succeed.
    #[error("failed to spawn arbiter thread: {0}")]
    SpawnFailed(#[from] io::Error),
}
