//! Planar point-loop polygons with cached plane equations, half-space
//! clipping, and convex decomposition.

use crate::aabb::Aabb;
use crate::beam::Beam;
use crate::float_types::Real;
use crate::material::Material;
use crate::plane::Plane;
use nalgebra::{Point3, Vector3};

/// Result of clipping a polygon against one or more half-spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipOutcome {
    /// No vertex was removed.
    Unchanged,
    /// The vertex set changed but the polygon survived.
    Clipped,
    /// Nothing is left.
    Vanished,
}

/// An ordered loop of at least three points.
///
/// Insertion order defines the winding and thereby the direction of the
/// cached plane normal. The plane equation is recomputed whenever the point
/// set is replaced wholesale, but deliberately **not** after clipping: a
/// clipped polygon stays on its original supporting plane, and recomputing
/// from clipped vertices would only add numerical noise.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<Point3<Real>>,
    plane: Plane,
    material: Material,
    name: String,
    id: u64,
}

impl Polygon {
    /// Build a polygon from a point loop; the plane equation is fitted to the
    /// loop (see [`Polygon::refit_plane`]).
    pub fn new(points: Vec<Point3<Real>>, material: Material, name: impl Into<String>) -> Self {
        let mut poly = Polygon {
            points,
            plane: Plane::new(Vector3::zeros(), 0.0),
            material,
            name: name.into(),
            id: 0,
        };
        poly.refit_plane();
        poly
    }

    /// Build a polygon that inherits an already-fitted plane equation.
    /// Used by clipping, triangulation and convex splitting, where the parts
    /// must keep the parent's exact supporting plane.
    pub fn with_plane(
        points: Vec<Point3<Real>>,
        plane: Plane,
        material: Material,
        id: u64,
        name: impl Into<String>,
    ) -> Self {
        Polygon {
            points,
            plane,
            material,
            name: name.into(),
            id,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn points(&self) -> &[Point3<Real>] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, i: usize) -> &Point3<Real> {
        &self.points[i]
    }

    pub const fn plane(&self) -> &Plane {
        &self.plane
    }

    pub const fn normal(&self) -> Vector3<Real> {
        self.plane.normal
    }

    pub const fn material(&self) -> &Material {
        &self.material
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Replace the point loop and refit the plane.
    pub fn set_points(&mut self, points: Vec<Point3<Real>>) {
        self.points = points;
        self.refit_plane();
    }

    /// Fit the cached plane equation to the current loop.
    ///
    /// Among all vertex triples the one with the largest cross-product
    /// magnitude is the best conditioned, which matters for the thin sliver
    /// polygons that real architectural data is full of. The winner is then
    /// oriented to agree with the aggregate fan normal so the plane direction
    /// still follows the insertion winding, and the equation is normalized.
    pub fn refit_plane(&mut self) {
        let n = self.points.len();
        if n < 3 {
            self.plane = Plane::new(Vector3::zeros(), 0.0);
            return;
        }

        let mut normal_sum = Vector3::zeros();
        for i in 0..n - 2 {
            let v0 = &self.points[0];
            let v1 = &self.points[i + 1];
            let v2 = &self.points[i + 2];
            normal_sum += (v1 - v0).cross(&(v2 - v0));
        }

        let mut best_magnitude = 0.0;
        let mut best = Plane::new(Vector3::zeros(), 0.0);
        for i in 0..n - 2 {
            for j in i + 1..n - 1 {
                for k in j + 1..n {
                    let pleq = Plane::from_points(&self.points[i], &self.points[j], &self.points[k]);
                    let mag = pleq.normal.norm_squared();
                    if mag > best_magnitude {
                        best_magnitude = mag;
                        best = pleq;
                    }
                }
            }
        }

        if best_magnitude == 0.0 {
            self.plane = best;
            return;
        }

        if best.normal.dot(&normal_sum) < 0.0 {
            best = -best;
        }
        self.plane = best.normalize();
    }

    /// Area via the fan cross-product sum.
    pub fn area(&self) -> Real {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = Vector3::zeros();
        for i in 0..n - 2 {
            let v0 = &self.points[0];
            let v1 = &self.points[i + 1];
            let v2 = &self.points[i + 2];
            sum += (v1 - v0).cross(&(v2 - v0));
        }
        0.5 * sum.norm()
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(self.points.iter().copied())
            .unwrap_or_else(|| Aabb::from_point(Point3::origin()))
    }

    /// Largest absolute deviation of any vertex from the cached plane.
    pub fn non_planarity(&self) -> Real {
        self.points
            .iter()
            .fold(0.0, |err, p| err.max(self.plane.eval(p).abs()))
    }

    /// Dilate the loop about its centroid by the relative factor `eps`.
    pub fn expand(&mut self, eps: Real) {
        let n = self.points.len();
        if n == 0 {
            return;
        }
        let mut c = Vector3::zeros();
        for p in &self.points {
            c += p.coords;
        }
        c /= n as Real;
        let c = Point3::from(c);
        for p in &mut self.points {
            *p = c + (*p - c) * (1.0 + eps);
        }
    }

    /// Clip against a half-space, keeping the `eval >= 0` side.
    pub fn clip(&mut self, plane: &Plane) -> ClipOutcome {
        let n = self.points.len();
        if n == 0 {
            return ClipOutcome::Vanished;
        }
        let mut out = Vec::with_capacity(2 * n);
        let outcome = clip_loop(&self.points, plane, &mut out);
        self.points = out;
        outcome
    }

    /// Clip against all six faces of a box.
    pub fn clip_aabb(&mut self, aabb: &Aabb) -> ClipOutcome {
        let mut clipped = false;
        for axis in 0..3 {
            for dir in 0..2 {
                let mut normal = Vector3::zeros();
                normal[axis] = if dir == 1 { 1.0 } else { -1.0 };
                let offset = -normal[axis]
                    * if dir == 1 {
                        aabb.min[axis]
                    } else {
                        aabb.max[axis]
                    };
                match self.clip(&Plane::new(normal, offset)) {
                    ClipOutcome::Vanished => return ClipOutcome::Vanished,
                    ClipOutcome::Clipped => clipped = true,
                    ClipOutcome::Unchanged => {},
                }
            }
        }
        if clipped {
            ClipOutcome::Clipped
        } else {
            ClipOutcome::Unchanged
        }
    }

    /// Clip against every bounding half-space of a beam, short-circuiting as
    /// soon as the polygon vanishes.
    pub fn clip_beam(&mut self, beam: &Beam) -> ClipOutcome {
        let m = self.points.len();
        if m == 0 {
            return ClipOutcome::Vanished;
        }
        let n = beam.num_planes();
        if n == 0 {
            return ClipOutcome::Unchanged;
        }

        let mut result = ClipOutcome::Unchanged;
        let mut src = std::mem::take(&mut self.points);
        let mut dst = Vec::with_capacity((n + m) * 2);

        for plane in beam.planes() {
            dst.clear();
            match clip_loop(&src, plane, &mut dst) {
                ClipOutcome::Vanished => return ClipOutcome::Vanished,
                ClipOutcome::Clipped => result = ClipOutcome::Clipped,
                ClipOutcome::Unchanged => {},
            }
            std::mem::swap(&mut src, &mut dst);
        }

        self.points = src;
        result
    }

    /// Convexity test in the polygon's own 2D basis: every corner must turn
    /// the same way.
    pub fn is_convex(&self) -> bool {
        let np = self.points.len();
        if np < 3 {
            return false;
        }
        let (u, v) = basis2d(&self.plane.normal);

        for i in 0..np {
            let p0 = project2(&self.points[i], &u, &v);
            let p1 = project2(&self.points[(i + 1) % np], &u, &v);
            let p2 = project2(&self.points[(i + 2) % np], &u, &v);

            let c = (p1.0 - p0.0) * (p2.1 - p0.1) - (p2.0 - p0.0) * (p1.1 - p0.1);
            if c < 0.0 {
                return false;
            }
        }
        true
    }

    /// Ear-clipping triangulation. Every triangle keeps the parent's plane,
    /// material, id and name. The exact tessellation order is not meaningful.
    pub fn triangulate(&self) -> Vec<Polygon> {
        let n = self.points.len();
        let mut triangles = Vec::new();
        if n < 3 {
            return triangles;
        }
        if n == 3 {
            triangles.push(self.clone());
            return triangles;
        }

        let (u, v) = basis2d(&self.plane.normal);
        let pts2: Vec<(Real, Real)> = self.points.iter().map(|p| project2(p, &u, &v)).collect();

        let mut idx: Vec<usize> = (0..n).collect();
        while idx.len() > 3 {
            let m = idx.len();
            let mut clipped = false;

            for i in 0..m {
                let ia = idx[(i + m - 1) % m];
                let ib = idx[i];
                let ic = idx[(i + 1) % m];
                let a = pts2[ia];
                let b = pts2[ib];
                let c = pts2[ic];

                let cross = (b.0 - a.0) * (c.1 - b.1) - (c.0 - b.0) * (b.1 - a.1);
                if cross <= 0.0 {
                    continue; // reflex or collinear corner
                }

                let blocked = idx.iter().any(|&j| {
                    j != ia && j != ib && j != ic && point_strictly_in_triangle(pts2[j], a, b, c)
                });
                if blocked {
                    continue;
                }

                triangles.push(self.sub_polygon(&[ia, ib, ic]));
                idx.remove(i);
                clipped = true;
                break;
            }

            if !clipped {
                // Degenerate remainder (collinear run); fall back to a fan so
                // we never loop forever.
                for i in 1..idx.len() - 1 {
                    triangles.push(self.sub_polygon(&[idx[0], idx[i], idx[i + 1]]));
                }
                return triangles;
            }
        }
        triangles.push(self.sub_polygon(&idx));
        triangles
    }

    /// Decompose into convex parts: triangulate, then greedily merge
    /// edge-adjacent parts whenever the merged loop stays convex. The spatial
    /// index and the beam intersection math require convex input.
    pub fn split_convex(&self) -> Vec<Polygon> {
        let triangles = self.triangulate();

        // Weld exactly equal vertices so shared edges are index pairs.
        let mut vertices: Vec<Point3<Real>> = Vec::new();
        let mut partials: Vec<Vec<usize>> = Vec::with_capacity(triangles.len());
        for tri in &triangles {
            let mut loop_idx = Vec::with_capacity(tri.num_points());
            for p in tri.points() {
                let existing = vertices.iter().position(|q| q == p);
                let k = match existing {
                    Some(k) => k,
                    None => {
                        vertices.push(*p);
                        vertices.len() - 1
                    },
                };
                loop_idx.push(k);
            }
            partials.push(loop_idx);
        }

        while self.merge_partials(&mut partials, &vertices) {}

        partials
            .iter()
            .map(|loop_idx| {
                let pts = loop_idx.iter().map(|&k| vertices[k]).collect();
                Polygon::with_plane(pts, self.plane, self.material, self.id, self.name.clone())
            })
            .collect()
    }

    /// One greedy merge step: find any pair of partial loops sharing a
    /// directed edge, splice them, and keep the result if it is convex.
    fn merge_partials(&self, partials: &mut Vec<Vec<usize>>, vertices: &[Point3<Real>]) -> bool {
        for i in 0..partials.len() {
            let n = partials[i].len();
            for j in 0..n {
                let iv0 = partials[i][j];
                let iv1 = partials[i][(j + 1) % n];

                for k in 0..partials.len() {
                    if k == i {
                        continue;
                    }
                    let m = partials[k].len();
                    for p in 0..m {
                        let jv0 = partials[k][p];
                        let jv1 = partials[k][(p + 1) % m];
                        if iv0 != jv1 || iv1 != jv0 {
                            continue;
                        }

                        let mut merged = Vec::with_capacity(n + m - 2);
                        for q in 0..n {
                            merged.push(partials[i][(j + 1 + q) % n]);
                        }
                        for q in 0..m - 2 {
                            merged.push(partials[k][(p + 2 + q) % m]);
                        }

                        let pts: Vec<Point3<Real>> =
                            merged.iter().map(|&q| vertices[q]).collect();
                        let candidate = Polygon::with_plane(
                            pts,
                            self.plane,
                            self.material,
                            self.id,
                            self.name.clone(),
                        );
                        if candidate.is_convex() {
                            partials[i] = merged;
                            partials.swap_remove(k);
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn sub_polygon(&self, indices: &[usize]) -> Polygon {
        let pts = indices.iter().map(|&i| self.points[i]).collect();
        Polygon::with_plane(pts, self.plane, self.material, self.id, self.name.clone())
    }
}

/// Sutherland-Hodgman half-space clip of one loop, keeping `eval >= 0`.
/// Output is written into `out`, bounded by `2 * in_pts.len()`.
fn clip_loop(in_pts: &[Point3<Real>], plane: &Plane, out: &mut Vec<Point3<Real>>) -> ClipOutcome {
    out.clear();
    let n = in_pts.len();
    if n == 0 {
        return ClipOutcome::Vanished;
    }

    let mut result = ClipOutcome::Unchanged;
    let mut b = in_pts[n - 1];
    let mut sb = plane.eval(&b);

    for p in in_pts {
        let a = b;
        let sa = sb;
        b = *p;
        sb = plane.eval(&b);
        let na = sa < 0.0;
        let nb = sb < 0.0;

        if !na && !nb {
            out.push(b);
            continue;
        }

        result = ClipOutcome::Clipped;
        if na && nb {
            continue;
        }

        let t = sa / (sa - sb);
        out.push(a + t * (b - a));
        if na {
            out.push(b);
        }
    }

    debug_assert!(out.len() <= n * 2);
    if out.is_empty() {
        return ClipOutcome::Vanished;
    }
    result
}

/// An orthonormal 2D basis `(u, v)` spanning the plane with normal `n`,
/// right-handed with it: loops winding with `n` project counter-clockwise.
pub(crate) fn basis2d(n: &Vector3<Real>) -> (Vector3<Real>, Vector3<Real>) {
    let p = Vector3::x().cross(n);
    let q = Vector3::y().cross(n);
    let (mut u, mut v) = if p.norm_squared() > q.norm_squared() {
        (p, n.cross(&p))
    } else {
        (-n.cross(&q), q)
    };
    u.normalize_mut();
    v.normalize_mut();
    (u, v)
}

#[inline]
fn project2(p: &Point3<Real>, u: &Vector3<Real>, v: &Vector3<Real>) -> (Real, Real) {
    (u.dot(&p.coords), v.dot(&p.coords))
}

fn point_strictly_in_triangle(
    p: (Real, Real),
    a: (Real, Real),
    b: (Real, Real),
    c: (Real, Real),
) -> bool {
    let edge = |p0: (Real, Real), p1: (Real, Real)| -> Real {
        (p1.0 - p0.0) * (p.1 - p0.1) - (p.0 - p0.0) * (p1.1 - p0.1)
    };
    edge(a, b) > 0.0 && edge(b, c) > 0.0 && edge(c, a) > 0.0
}
