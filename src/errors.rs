//! Solver errors.
//!
//! Degenerate geometry is never an error: sliver polygons, vanished clips and
//! near-zero areas are silently discarded at the point of detection, because
//! real architectural data is full of them. The variants here cover programmer
//! errors and normal non-success control flow instead.

use thiserror::Error;

/// All the ways a solve or update can decline to produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    /// `update()` was called before any successful `solve()`.
    #[error("no solution available; call solve() before update()")]
    NotSolved,

    /// The in-flight `solve()` observed its cancel token. The partially built
    /// solution must be discarded, never published.
    #[error("solve was cancelled")]
    Cancelled,

    /// The room contains no polygons, so no spatial index can be built.
    #[error("room has no polygons")]
    EmptyRoom,

    /// A solver configuration with `min_order > max_order`.
    #[error("invalid reflection order range: min {min} > max {max}")]
    InvalidOrderRange { min: usize, max: usize },
}
