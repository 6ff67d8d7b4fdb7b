//! Error types for the host-side lane group.
//!
//! The per-lane sort itself cannot fail; only setting up the lane threads and
//! feeding data into a group can.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaneError {
    #[error("failed to start lane threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("expected one element per lane ({expected} lanes), got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, LaneError>;
