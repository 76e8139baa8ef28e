//! The image-source path solver.
//!
//! `solve()` grows a beam tree from the source: every reflection off a convex
//! polygon is replaced by a straight line from a mirrored image source, and
//! the set of listener positions that can see a given reflection sequence is
//! exactly a beam. The tree is listener-independent, so a moving listener
//! only needs `update()`: walk the cached nodes, discard whole buckets via
//! skip spheres, discard single nodes via fail planes, and fully validate the
//! few survivors.

use crate::beam::Beam;
use crate::errors::SolveError;
use crate::float_types::{Real, Tolerances};
use crate::material::NUM_BANDS;
use crate::plane::Plane;
use crate::polygon::{ClipOutcome, Polygon};
use crate::ray::Ray;
use crate::room::Room;
use crate::solver::CancelToken;
use log::{debug, warn};
use nalgebra::Point3;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Nodes are grouped into buckets of this size, each with one skip sphere.
const DISTANCE_SKIP_BUCKET_SIZE: usize = 16;

/// One validated specular path from source to listener.
///
/// `points[0]` is the source, `points[len-1]` the listener, and the interior
/// points are reflection points in propagation order. `polygons` holds the
/// reflecting convex-part indices in the same order, so
/// `points.len() == polygons.len() + 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub order: usize,
    pub points: Vec<Point3<Real>>,
    pub polygons: Vec<u32>,
}

impl Path {
    /// Total travelled distance along the straightened segments.
    pub fn length(&self) -> Real {
        self.points
            .windows(2)
            .map(|w| (w[1] - w[0]).norm())
            .sum()
    }
}

/// One node of the beam tree: the reflecting polygon and the parent link.
/// The root is a sentinel with no polygon and parent `-1`.
#[derive(Debug, Clone, Copy)]
struct SolutionNode {
    parent: i32,
    polygon: u32,
}

/// Dedup index key ordered by `total_cmp` so it can live in a `BTreeMap`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FirstPointKey(Real);

impl Eq for FirstPointKey {}

impl PartialOrd for FirstPointKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FirstPointKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A pending expansion of one beam-tree node during `solve`.
struct Frame {
    beam: Beam,
    source: Point3<Real>,
    order: usize,
    node: usize,
}

/// The solver state for one room / source / maximum order.
///
/// `solve` is the expensive listener-independent phase; `update` re-derives
/// the path list for a new listener position from the cached tree. The two
/// never run concurrently on one instance because both take `&mut self`.
#[derive(Debug, Clone)]
pub struct PathSolution {
    room: Arc<Room>,
    maximum_order: usize,
    tol: Tolerances,

    nodes: Vec<SolutionNode>,
    fail_planes: Vec<Plane>,
    skip_spheres: Vec<(Point3<Real>, Real)>,
    cached_source: Option<Point3<Real>>,

    paths: Vec<Path>,
    first_point_index: BTreeMap<FirstPointKey, Vec<usize>>,
}

impl PathSolution {
    pub fn new(room: Arc<Room>, maximum_order: usize) -> Self {
        let tol = *room.tolerances();
        PathSolution {
            room,
            maximum_order,
            tol,
            nodes: Vec::new(),
            fail_planes: Vec::new(),
            skip_spheres: Vec::new(),
            cached_source: None,
            paths: Vec::new(),
            first_point_index: BTreeMap::new(),
        }
    }

    pub const fn maximum_order(&self) -> usize {
        self.maximum_order
    }

    pub const fn room(&self) -> &Arc<Room> {
        &self.room
    }

    pub fn is_solved(&self) -> bool {
        self.cached_source.is_some()
    }

    /// Beam-tree size; mostly useful for diagnostics and tests.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn num_paths(&self) -> usize {
        self.paths.len()
    }

    /// Paths whose reflection order falls in `range`.
    pub fn paths_with_order(
        &self,
        range: RangeInclusive<usize>,
    ) -> impl Iterator<Item = &Path> {
        self.paths.iter().filter(move |p| range.contains(&p.order))
    }

    /// Resolve a path's polygon indices to the room's convex parts.
    pub fn path_polygons<'a>(&'a self, path: &Path) -> Vec<&'a Polygon> {
        path.polygons
            .iter()
            .map(|&pi| &self.room.convex_polygons()[pi as usize])
            .collect()
    }

    /// Cumulative per-band reflectance over every surface the path touches.
    pub fn path_reflectance(&self, path: &Path) -> [Real; NUM_BANDS] {
        let mut r = [1.0; NUM_BANDS];
        for &pi in &path.polygons {
            let m = self.room.convex_polygons()[pi as usize].material();
            for (r, a) in r.iter_mut().zip(m.absorption.iter()) {
                *r *= 1.0 - a;
            }
        }
        r
    }

    fn clear_solution(&mut self) {
        self.nodes.clear();
        self.fail_planes.clear();
        self.skip_spheres.clear();
        self.cached_source = None;
        self.paths.clear();
        self.first_point_index.clear();
    }

    /// Build the beam tree for `source` from scratch.
    ///
    /// The target position only seeds the cached fail planes; the tree itself
    /// is listener-independent. Cancellation is checked at every expansion
    /// and every candidate; a cancelled solve discards everything it built
    /// and returns `Err(Cancelled)`.
    pub fn solve(
        &mut self,
        source: &Point3<Real>,
        target: &Point3<Real>,
        cancel: &CancelToken,
    ) -> Result<(), SolveError> {
        let room = Arc::clone(&self.room);
        let polygons = room.convex_polygons();
        let bsp = room.bsp();

        self.clear_solution();
        self.nodes.push(SolutionNode {
            parent: -1,
            polygon: u32::MAX,
        });
        self.fail_planes.push(Plane::always_pass());

        let mut stack = vec![Frame {
            beam: Beam::unbounded(),
            source: *source,
            order: 0,
            node: 0,
        }];

        while let Some(frame) = stack.pop() {
            if cancel.is_cancelled() {
                self.clear_solution();
                return Err(SolveError::Cancelled);
            }
            if frame.order >= self.maximum_order {
                continue;
            }

            let candidates = bsp.beam_cast(&frame.beam, polygons);
            for &pi in candidates.iter().rev() {
                if cancel.is_cancelled() {
                    self.clear_solution();
                    return Err(SolveError::Cancelled);
                }

                let orig = &polygons[pi as usize];
                let img_source = orig.plane().mirror_point(&frame.source);

                if frame.node > 0 {
                    // Reject reflecting off the parent polygon again, and the
                    // degenerate pair that mirrors straight back to where the
                    // beam came from.
                    let parent_pi = self.nodes[frame.node].polygon;
                    if pi == parent_pi {
                        continue;
                    }
                    let parent_plane = polygons[parent_pi as usize].plane();
                    let test_source = parent_plane.mirror_point(&img_source);
                    if (frame.source - test_source).norm() < self.tol.similar_paths {
                        continue;
                    }
                }

                let mut clipped = orig.clone();
                if clipped.clip_beam(&frame.beam) == ClipOutcome::Vanished {
                    continue;
                }
                if clipped.area() < self.tol.degenerate_area {
                    continue;
                }

                let child_beam = Beam::new(img_source, clipped, self.tol.expand_beam);
                let node = self.nodes.len();
                self.nodes.push(SolutionNode {
                    parent: frame.node as i32,
                    polygon: pi,
                });
                self.fail_planes.push(fail_plane_for(&child_beam, target));
                stack.push(Frame {
                    beam: child_beam,
                    source: img_source,
                    order: frame.order + 1,
                    node,
                });
            }
        }

        self.cached_source = Some(*source);
        let num_buckets = self.nodes.len().div_ceil(DISTANCE_SKIP_BUCKET_SIZE);
        self.skip_spheres = vec![(Point3::origin(), 0.0); num_buckets];
        debug!(
            "solve: {} nodes, {} buckets, order {}",
            self.nodes.len(),
            num_buckets,
            self.maximum_order
        );
        Ok(())
    }

    /// Re-derive the path list for a new listener position from the cached
    /// beam tree.
    pub fn update(&mut self, target: &Point3<Real>) -> Result<(), SolveError> {
        let Some(source) = self.cached_source else {
            return Err(SolveError::NotSolved);
        };

        self.paths.clear();
        self.first_point_index.clear();

        let n = self.nodes.len();
        let mut buckets_processed = 0usize;
        let mut nodes_validated = 0usize;

        for b in 0..self.skip_spheres.len() {
            // The sphere records a region where every fail plane of the
            // bucket was known negative; a listener inside it cannot see any
            // of the bucket's beams.
            let (center, radius_sq) = self.skip_spheres[b];
            if (target - center).norm_squared() < radius_sq {
                continue;
            }
            buckets_processed += 1;

            let imn = b * DISTANCE_SKIP_BUCKET_SIZE;
            let imx = (imn + DISTANCE_SKIP_BUCKET_SIZE).min(n);
            let mut maxdot = Real::NEG_INFINITY;

            for i in imn..imx {
                let d = self.fail_planes[i].eval(target);
                if d >= 0.0 {
                    self.validate_path(&source, target, i);
                    nodes_validated += 1;
                }
                if d > maxdot {
                    maxdot = d;
                }
            }

            // All fail planes negative: every listener closer to the target
            // than the nearest plane stays on the failing side, so the bucket
            // can be skipped wholesale until the listener leaves that sphere.
            if maxdot < 0.0 {
                self.skip_spheres[b] = (*target, maxdot * maxdot);
            }
        }

        debug!(
            "update: {n} nodes, {buckets_processed} buckets processed, \
             {nodes_validated} validated, {} paths",
            self.paths.len()
        );
        Ok(())
    }

    /// Fully check one beam-tree node against the listener: geometric
    /// validity of the reflection chain, then occlusion of every segment.
    /// On a geometric miss the node's fail plane is re-derived so the next
    /// `update` can reject the node with one dot product.
    fn validate_path(&mut self, source: &Point3<Real>, target: &Point3<Real>, node_index: usize) {
        let room = Arc::clone(&self.room);
        let polygons = room.convex_polygons();

        // Polygon chain, leaf first.
        let mut chain: Vec<u32> = Vec::with_capacity(self.maximum_order);
        let mut idx = node_index;
        while idx != 0 {
            chain.push(self.nodes[idx].polygon);
            idx = self.nodes[idx].parent as usize;
        }
        let order = chain.len();

        // Rebuild the image source through the chain, root first.
        let mut img_source = *source;
        for &pi in chain.iter().rev() {
            img_source = polygons[pi as usize].plane().mirror_point(&img_source);
        }

        // March from the deepest image source towards the target, unfolding
        // one mirror per step. A failure is either a side miss (source image
        // and target on the same side of the polygon) or an edge miss (the
        // connecting segment passes outside the polygon loop).
        let mut s = img_source;
        let mut t = *target;
        let mut isects: Vec<Point3<Real>> = Vec::with_capacity(order);
        let mut miss: Option<(usize, bool, Ray)> = None;

        for (i, &pi) in chain.iter().enumerate() {
            let poly = &polygons[pi as usize];
            let pleq = poly.plane();
            let ray = Ray::new(s, t);

            if pleq.eval(&s) * pleq.eval(&t) > 0.0 {
                miss = Some((i, true, ray));
                break;
            }
            if !ray.intersects_loop(poly) {
                miss = Some((i, false, ray));
                break;
            }

            let isect = ray.intersection_with(pleq);
            s = pleq.mirror_point(&s);
            t = isect;
            isects.push(isect);
        }

        if let Some((miss_order, side_miss, ray)) = miss {
            self.fail_planes[node_index] =
                self.rebuild_fail_plane(polygons, &chain, miss_order, side_miss, &ray, source, target);
            return;
        }

        // Geometric success. Occlusion-test each straightened segment from
        // the listener back to the source; a blocked segment invalidates the
        // path for this listener position only, so the fail plane is left
        // alone.
        let bsp = room.bsp();
        let mut t = *target;
        for &isect in &isects {
            if bsp.ray_cast_any(&Ray::new(isect, t), polygons) {
                return;
            }
            t = isect;
        }
        if bsp.ray_cast_any(&Ray::new(*source, t), polygons) {
            return;
        }

        // Assemble the path in propagation order.
        let mut points = vec![Point3::origin(); order + 2];
        let mut path_polys = vec![0u32; order];
        let mut t = *target;
        for (i, &pi) in chain.iter().enumerate() {
            points[order - i + 1] = t;
            path_polys[order - i - 1] = pi;
            t = isects[i];
        }
        points[0] = *source;
        points[1] = t;

        self.push_path_deduplicated(Path {
            order,
            points,
            polygons: path_polys,
        });
    }

    /// Derive a replacement fail plane after a geometric miss, escalating
    /// through three constructions until the target lands on the negative
    /// side.
    #[allow(clippy::too_many_arguments)]
    fn rebuild_fail_plane(
        &self,
        polygons: &[Polygon],
        chain: &[u32],
        miss_order: usize,
        side_miss: bool,
        ray: &Ray,
        source: &Point3<Real>,
        target: &Point3<Real>,
    ) -> Plane {
        let miss_poly = &polygons[chain[miss_order] as usize];

        let mut miss_plane = if side_miss {
            // The polygon's own plane, flipped away from the image source.
            let mut p = *miss_poly.plane();
            if p.eval(&ray.a) > 0.0 {
                p = -p;
            }
            p
        } else {
            // The segment passed outside the loop: the frustum plane of the
            // missed polygon (as seen from the image source) nearest the
            // segment end is the separating one.
            let beam = Beam::new(ray.a, miss_poly.clone(), self.tol.expand_beam);
            let mut best = *beam.plane(1);
            for i in 2..beam.num_planes() {
                if beam.plane(i).eval(&ray.b) < best.eval(&ray.b) {
                    best = *beam.plane(i);
                }
            }
            best
        };

        // Fold the plane back out through the part of the chain the march
        // had already unfolded.
        for &pi in chain[..miss_order].iter().rev() {
            miss_plane = miss_plane.mirrored_across(polygons[pi as usize].plane());
        }

        if miss_plane.eval(target) > 0.0 {
            // Numerical drift put the target on the wrong side; fall back to
            // an exact beam-chain rebuild with fresh clips.
            let mut beam = Beam::unbounded();
            let mut img = *source;
            for &pi in chain.iter().rev() {
                let mut poly = polygons[pi as usize].clone();
                poly.clip_beam(&beam);
                img = poly.plane().mirror_point(&img);
                beam = Beam::new(img, poly, self.tol.expand_beam);
            }
            miss_plane = fail_plane_for(&beam, target);

            if miss_plane.eval(target) > 0.0 {
                warn!(
                    "fail plane still positive at listener after exact rebuild; \
                     geometric tolerances may need tuning"
                );
            }
        }

        miss_plane.normalize()
    }

    /// Append a validated path unless an equivalent one is already recorded.
    ///
    /// Candidates are indexed by the scalar `points[1] · (1,1,1)`; anything
    /// within twice the similarity tolerance and of equal order is compared
    /// point by point. The first recorded path wins.
    fn push_path_deduplicated(&mut self, path: Path) {
        let eps = self.tol.similar_paths;
        let fval = path.points[1].coords.sum();
        let lo = Bound::Excluded(FirstPointKey(fval - 2.0 * eps));
        let hi = Bound::Included(FirstPointKey(fval + 2.0 * eps));

        for (_, indices) in self.first_point_index.range((lo, hi)) {
            for &i in indices {
                let existing = &self.paths[i];
                if existing.order != path.order {
                    continue;
                }
                let distinct = (1..existing.points.len() - 1).any(|j| {
                    (existing.points[j] - path.points[j]).norm_squared() > eps * eps
                });
                if !distinct {
                    return;
                }
            }
        }

        self.first_point_index
            .entry(FirstPointKey(fval))
            .or_default()
            .push(self.paths.len());
        self.paths.push(path);
    }
}

/// The beam plane evaluating lowest at the target. Beams are convex, so this
/// is the plane the target would cross last when approaching the beam, and
/// therefore the strongest single-plane rejection test. An unconstrained
/// beam gets the degenerate always-pass plane.
fn fail_plane_for(beam: &Beam, target: &Point3<Real>) -> Plane {
    if beam.num_planes() == 0 {
        return Plane::always_pass();
    }
    let mut best = *beam.plane(0);
    for i in 1..beam.num_planes() {
        if beam.plane(i).eval(target) < best.eval(target) {
            best = *beam.plane(i);
        }
    }
    best
}
