//! Specular acoustic reflection paths between a sound source and a listener in a
//! polygonal room, computed with the **image-source method** accelerated by beam
//! tracing over a [BSP](bsp) spatial index.
//!
//! The crate enumerates every specular reflection path up to a maximum order,
//! validates each against occlusion and polygon boundaries, and keeps a live
//! solution updated as the listener moves:
//!
//! - [`Room`] owns the geometry: canonical polygons, their convex
//!   decomposition, and the BSP tree built over the convex set.
//! - [`PathSolution::solve`] grows the full candidate reflection tree from
//!   scratch (call after the source or the geometry changed).
//! - [`PathSolution::update`] re-validates only the listener-dependent part
//!   using cached fail planes and per-bucket skip spheres, which makes
//!   per-frame listener movement cheap.
//! - [`SolveWorker`] runs a cancellable `solve()` on a worker thread and hands
//!   the finished solution back through a mutex-guarded slot.
//!
//! # Features
//! - **f64**: use f64 as `Real` (default)
//! - **f32**: use f32 as `Real`, conflicts with f64

#![forbid(unsafe_code)]
#![warn(clippy::approx_constant, clippy::all)]

pub mod aabb;
pub mod beam;
pub mod bsp;
pub mod errors;
pub mod float_types;
pub mod material;
pub mod plane;
pub mod polygon;
pub mod ray;
pub mod room;
pub mod solution;
pub mod solver;

#[cfg(any(all(feature = "f64", feature = "f32"), not(any(feature = "f64", feature = "f32"))))]
compile_error!("Either 'f64' or 'f32' feature must be specified, but not both");

pub use aabb::Aabb;
pub use beam::Beam;
pub use bsp::{BspNode, BspTree, RayHit};
pub use errors::SolveError;
pub use float_types::{Real, Tolerances};
pub use material::{Material, MaterialLibrary, NUM_BANDS};
pub use plane::Plane;
pub use polygon::{ClipOutcome, Polygon};
pub use ray::Ray;
pub use room::{Listener, Room, Source};
pub use solution::{Path, PathSolution};
pub use solver::{CancelToken, Movement, SolveWorker, SolverConfig};
