//! Solve coordination: cancellation, movement classification, and the
//! background worker that runs a full `solve` off the caller's thread.

use crate::errors::SolveError;
use crate::float_types::Real;
use crate::room::Listener;
use crate::solution::PathSolution;
use log::debug;
use nalgebra::Point3;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Shared cancellation flag, checked cooperatively inside
/// [`PathSolution::solve`]. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// How far a listener has moved since the last solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    /// Below both thresholds; nothing to recompute.
    None,
    /// Orientation changed but the position barely moved; consumers can
    /// re-orient without touching path geometry.
    Minor,
    /// The position moved beyond the threshold; the path list must be
    /// re-derived (`update`, or a fresh `solve` when the source moved).
    Major,
}

/// Reflection order range and the movement thresholds callers use to decide
/// between `update()` and a full `solve()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    pub min_order: usize,
    pub max_order: usize,
    /// Squared position delta above which movement is major.
    pub position_threshold_sq: Real,
    /// Rotation angle in radians above which movement is at least minor.
    pub orientation_threshold: Real,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            min_order: 0,
            max_order: 3,
            position_threshold_sq: 0.01,
            orientation_threshold: 0.1,
        }
    }
}

impl SolverConfig {
    /// Reject configurations whose order range is empty.
    pub fn validated(self) -> Result<Self, SolveError> {
        if self.min_order > self.max_order {
            return Err(SolveError::InvalidOrderRange {
                min: self.min_order,
                max: self.max_order,
            });
        }
        Ok(self)
    }

    /// Classify a pose change against the thresholds.
    pub fn classify_movement(&self, old: &Listener, new: &Listener) -> Movement {
        if (new.position - old.position).norm_squared() > self.position_threshold_sq {
            return Movement::Major;
        }
        let angle = (old.orientation.inverse() * new.orientation).angle();
        if angle > self.orientation_threshold {
            return Movement::Minor;
        }
        Movement::None
    }
}

/// A one-shot background solve.
///
/// The worker thread runs `solve()` to completion on a solution it owns and
/// publishes the result through a mutex-guarded slot only when the solve
/// returned uncancelled; a cancelled solve publishes nothing. Ownership of
/// the solution transfers through the slot, so `update` on the taken
/// solution can never race the solve that produced it.
#[derive(Debug)]
pub struct SolveWorker {
    slot: Arc<Mutex<Option<PathSolution>>>,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl SolveWorker {
    /// Spawn a solve with a fresh cancel token.
    pub fn spawn(
        solution: PathSolution,
        source: Point3<Real>,
        target: Point3<Real>,
    ) -> SolveWorker {
        Self::spawn_with_token(solution, source, target, CancelToken::new())
    }

    /// Spawn a solve observing an externally owned cancel token.
    pub fn spawn_with_token(
        mut solution: PathSolution,
        source: Point3<Real>,
        target: Point3<Real>,
        cancel: CancelToken,
    ) -> SolveWorker {
        let slot = Arc::new(Mutex::new(None));
        let thread_slot = Arc::clone(&slot);
        let thread_cancel = cancel.clone();

        let handle = std::thread::spawn(move || {
            match solution.solve(&source, &target, &thread_cancel) {
                Ok(()) => {
                    let mut guard = thread_slot
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    *guard = Some(solution);
                },
                Err(err) => debug!("background solve ended without result: {err}"),
            }
        });

        SolveWorker {
            slot,
            cancel,
            handle: Some(handle),
        }
    }

    /// Ask the in-flight solve to stop at its next cancellation check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Take the finished solution if one has been published.
    pub fn try_take(&self) -> Option<PathSolution> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Wait for the worker thread and take whatever it published.
    pub fn join(mut self) -> Option<PathSolution> {
        if let Some(handle) = self.handle.take() {
            // A panicked solve publishes nothing; treat it like a cancel.
            let _ = handle.join();
        }
        self.try_take()
    }
}

impl Drop for SolveWorker {
    fn drop(&mut self) {
        // Let an abandoned worker wind down instead of running to completion.
        self.cancel.cancel();
    }
}
