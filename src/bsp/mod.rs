//! Axis-aligned BSP tree over polygon indices.
//!
//! The tree is stored as a flat arena of [`BspNode`]s in depth-first order,
//! with each split's left child immediately following it and the right child
//! at an explicit index. Leaves hold ranges into a shared index buffer, so a
//! polygon straddling a split plane appears in both subtrees without being
//! duplicated geometrically.
//!
//! Queries borrow the polygon slice the tree was built over; the tree itself
//! never owns geometry. All traversals are iterative over an explicit stack
//! or shallow recursion bounded by the tree depth, and keep their scratch
//! state on the call frame so concurrent queries on the same tree are safe.

use crate::aabb::Aabb;
use crate::beam::Beam;
use crate::errors::SolveError;
use crate::float_types::{Real, Tolerances};
use crate::polygon::{ClipOutcome, Polygon};
use crate::ray::Ray;
use nalgebra::{Point3, Vector3};

/// Leaves hold at most this many polygons unless no split plane helps.
const MAX_LEAF_POLYGONS: usize = 4;

/// One arena node. The left child of a `Split` lives at the next index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BspNode {
    Split { axis: u8, pos: Real, right: u32 },
    Leaf { start: u32, count: u32 },
}

/// The intersection a [`BspTree::ray_cast`] query reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Index of the hit polygon in the slice the tree was built over.
    pub polygon: u32,
    /// The intersection point.
    pub point: Point3<Real>,
}

#[derive(Debug, Clone)]
pub struct BspTree {
    nodes: Vec<BspNode>,
    leaf_polys: Vec<u32>,
    aabb: Aabb,
    tol: Tolerances,
}

impl BspTree {
    /// Build a tree over `polygons` using a surface-area-heuristic sweep.
    ///
    /// The scene bound is inflated slightly so geometry lying exactly on the
    /// outer faces is not dropped by the child-box clip tests.
    pub fn build(polygons: &[Polygon], tol: Tolerances) -> Result<BspTree, SolveError> {
        if polygons.is_empty() {
            return Err(SolveError::EmptyRoom);
        }

        let mut aabb = Aabb::from_point(*polygons[0].point(0));
        for poly in polygons {
            for p in poly.points() {
                aabb.grow(p);
            }
        }
        aabb.inflate(tol.bounding_box);

        let mut tree = BspTree {
            nodes: Vec::new(),
            leaf_polys: Vec::new(),
            aabb,
            tol,
        };
        let all: Vec<u32> = (0..polygons.len() as u32).collect();
        tree.build_node(polygons, all, aabb);
        Ok(tree)
    }

    pub const fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[BspNode] {
        &self.nodes
    }

    fn build_node(&mut self, polygons: &[Polygon], set: Vec<u32>, aabb: Aabb) {
        if set.len() <= MAX_LEAF_POLYGONS {
            self.push_leaf(set);
            return;
        }
        let Some((axis, pos)) = find_split_plane(polygons, &set, &aabb) else {
            self.push_leaf(set);
            return;
        };

        let mut left_box = aabb;
        left_box.max[axis] = pos;
        let mut right_box = aabb;
        right_box.min[axis] = pos;

        let left_set = self.partition(polygons, &set, axis, pos, &left_box, false);
        let right_set = self.partition(polygons, &set, axis, pos, &right_box, true);

        let node_idx = self.nodes.len();
        self.nodes.push(BspNode::Split {
            axis: axis as u8,
            pos,
            right: 0,
        });
        self.build_node(polygons, left_set, left_box);
        let right_idx = self.nodes.len() as u32;
        if let BspNode::Split { right, .. } = &mut self.nodes[node_idx] {
            *right = right_idx;
        }
        self.build_node(polygons, right_set, right_box);
    }

    fn push_leaf(&mut self, set: Vec<u32>) {
        let start = self.leaf_polys.len() as u32;
        let count = set.len() as u32;
        self.leaf_polys.extend(set);
        self.nodes.push(BspNode::Leaf { start, count });
    }

    /// Select the polygons belonging to one child of a split.
    ///
    /// A polygon whose extent sits exactly on the split plane goes to the
    /// right child only. Everything else is kept when some vertex lies
    /// strictly on the child's side, confirmed by clipping a copy against the
    /// child box inflated by the overlap tolerance.
    fn partition(
        &self,
        polygons: &[Polygon],
        set: &[u32],
        axis: usize,
        pos: Real,
        child_box: &Aabb,
        right: bool,
    ) -> Vec<u32> {
        let mut test_box = *child_box;
        test_box.inflate(self.tol.poly_box_overlap);

        let mut out = Vec::new();
        for &pi in set {
            let poly = &polygons[pi as usize];
            let pbox = poly.aabb();

            let overlap = if pbox.min[axis] == pos && pbox.max[axis] == pos {
                right
            } else if right {
                poly.points().iter().any(|p| p[axis] > pos)
            } else {
                poly.points().iter().any(|p| p[axis] < pos)
            };
            if !overlap {
                continue;
            }

            let mut clipped = poly.clone();
            if clipped.clip_aabb(&test_box) != ClipOutcome::Vanished {
                out.push(pi);
            }
        }
        out
    }

    /// Does anything block the open segment? Early-out occlusion test.
    pub fn ray_cast_any(&self, ray: &Ray, polygons: &[Polygon]) -> bool {
        let ctx = RayContext::new(ray, self.tol.ray_ends);
        let (enter, exit) = ctx.enter_exit(&self.aabb);
        self.walk_ray(&ctx, enter, exit, |leaf, _, _| {
            let probe = Ray::new(ctx.orig, ctx.dest);
            for &pi in leaf {
                if probe.intersects(&polygons[pi as usize]) {
                    return Some(true);
                }
            }
            None
        })
        .unwrap_or(false)
    }

    /// Nearest intersection along the segment, if any.
    pub fn ray_cast(&self, ray: &Ray, polygons: &[Polygon]) -> Option<RayHit> {
        let ctx = RayContext::new(ray, self.tol.ray_ends);
        let (enter, exit) = ctx.enter_exit(&self.aabb);
        let slack = self.tol.isect_polygon;
        self.walk_ray(&ctx, enter, exit, |leaf, d_enter, d_exit| {
            // Front-to-back traversal means the first leaf producing a hit
            // inside its own parametric window holds the nearest one.
            let probe = Ray::new(ctx.orig, ctx.dest);
            let t_low = d_enter - slack;
            let mut t_high = d_exit + slack;
            let mut best = None;
            for &pi in leaf {
                let poly = &polygons[pi as usize];
                if !probe.intersects(poly) {
                    continue;
                }
                let denom = ctx.dir.dot(&poly.plane().normal);
                let t = -poly.plane().eval(&ctx.orig) / denom;
                if t < t_low || t > t_high {
                    continue;
                }
                t_high = t;
                best = Some(RayHit {
                    polygon: pi,
                    point: ctx.orig + t * ctx.dir,
                });
            }
            best
        })
    }

    /// Front-to-back traversal shared by both ray queries. `visit_leaf` gets
    /// the leaf's polygon indices and the node's parametric window; the walk
    /// stops at the first `Some`.
    fn walk_ray<T>(
        &self,
        ctx: &RayContext,
        enter: Real,
        exit: Real,
        mut visit_leaf: impl FnMut(&[u32], Real, Real) -> Option<T>,
    ) -> Option<T> {
        let enter = enter.max(0.0);
        let exit = exit.min(1.0);
        if enter > exit + self.tol.distance {
            return None;
        }

        let mut stack: Vec<(u32, Real, Real)> = vec![(0, enter, exit)];
        while let Some((mut idx, enter, mut exit)) = stack.pop() {
            loop {
                match self.nodes[idx as usize] {
                    BspNode::Leaf { start, count } => {
                        let leaf = &self.leaf_polys[start as usize..(start + count) as usize];
                        if let Some(found) = visit_leaf(leaf, enter, exit) {
                            return Some(found);
                        }
                        break;
                    },
                    BspNode::Split { axis, pos, right } => {
                        let a = axis as usize;
                        let d = (pos - ctx.orig[a]) * ctx.invdir[a];
                        let (near, far) = if ctx.dirsgn[a] {
                            (right, idx + 1)
                        } else {
                            (idx + 1, right)
                        };
                        if d <= exit + self.tol.distance {
                            stack.push((far, d.max(enter), exit));
                        }
                        if d >= enter - self.tol.distance {
                            if d < exit {
                                exit = d;
                            }
                            idx = near;
                            continue;
                        }
                        break;
                    },
                }
            }
        }
        None
    }

    /// All polygons whose subtree cell touches the beam, deduplicated and in
    /// traversal order. An unbounded beam returns the whole scene.
    pub fn beam_cast(&self, beam: &Beam, polygons: &[Polygon]) -> Vec<u32> {
        let mut result = Vec::new();
        let mut visited = vec![false; polygons.len()];
        self.beam_cast_node(
            0,
            beam,
            self.aabb.center(),
            self.aabb.half_extent(),
            &mut visited,
            &mut result,
        );
        result
    }

    fn beam_cast_node(
        &self,
        idx: u32,
        beam: &Beam,
        mut mid: Point3<Real>,
        mut diag: Vector3<Real>,
        visited: &mut [bool],
        result: &mut Vec<u32>,
    ) {
        if !beam.is_unbounded() && !cell_touches_beam(&mid, &diag, beam) {
            return;
        }
        match self.nodes[idx as usize] {
            BspNode::Leaf { start, count } => {
                for &pi in &self.leaf_polys[start as usize..(start + count) as usize] {
                    if !visited[pi as usize] {
                        visited[pi as usize] = true;
                        result.push(pi);
                    }
                }
            },
            BspNode::Split { axis, pos, right } => {
                let a = axis as usize;
                let om = mid[a];
                let od = diag[a];

                mid[a] = 0.5 * (om - od + pos);
                diag[a] = pos - mid[a];
                self.beam_cast_node(idx + 1, beam, mid, diag, visited, result);

                mid[a] = 0.5 * (om + od + pos);
                diag[a] = mid[a] - pos;
                self.beam_cast_node(right, beam, mid, diag, visited, result);
            },
        }
    }
}

/// Conservative box/frustum test: the cell `(mid, diag)` survives when no
/// beam plane has the whole box strictly on its negative side.
fn cell_touches_beam(mid: &Point3<Real>, diag: &Vector3<Real>, beam: &Beam) -> bool {
    for plane in beam.planes() {
        let np = diag.x * plane.normal.x.abs()
            + diag.y * plane.normal.y.abs()
            + diag.z * plane.normal.z.abs();
        let mp = plane.eval(mid);
        if mp + np < 0.0 {
            return false;
        }
    }
    true
}

/// Per-query ray state: the segment shrunk at both ends so reflection points
/// sitting exactly on a polygon do not self-occlude, plus the precomputed
/// slab-test helpers.
struct RayContext {
    orig: Point3<Real>,
    dest: Point3<Real>,
    dir: Vector3<Real>,
    invdir: Vector3<Real>,
    dirsgn: [bool; 3],
}

impl RayContext {
    fn new(ray: &Ray, end_eps: Real) -> Self {
        let ndir = end_eps * (ray.b - ray.a).normalize();
        let orig = ray.a + ndir;
        let dest = ray.b - ndir;
        let dir = dest - orig;
        let invdir = Vector3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);
        RayContext {
            orig,
            dest,
            dir,
            invdir,
            dirsgn: [
                invdir.x.is_sign_negative(),
                invdir.y.is_sign_negative(),
                invdir.z.is_sign_negative(),
            ],
        }
    }

    /// Parametric window where the segment overlaps `aabb` (slab method).
    fn enter_exit(&self, aabb: &Aabb) -> (Real, Real) {
        let mut enter = Real::NEG_INFINITY;
        let mut exit = Real::INFINITY;
        for a in 0..3 {
            let d0 = (aabb.min[a] - self.orig[a]) * self.invdir[a];
            let d1 = (aabb.max[a] - self.orig[a]) * self.invdir[a];
            let (mn, mx) = if self.dirsgn[a] { (d1, d0) } else { (d0, d1) };
            if mn > enter {
                enter = mn;
            }
            if mx < exit {
                exit = mx;
            }
        }
        (enter, exit)
    }
}

/// Sweep all three axes for the cheapest split per the surface-area
/// heuristic: candidate positions are polygon extent endpoints strictly
/// inside the bound, and the cost weighs child surface areas by how many
/// polygons land in each child. Returns `None` when no candidate beats
/// keeping a leaf.
fn find_split_plane(polygons: &[Polygon], set: &[u32], aabb: &Aabb) -> Option<(usize, Real)> {
    let mut best: Option<(Real, usize, Real)> = None;
    let mut items: Vec<(Real, u32)> = Vec::with_capacity(set.len() * 2);

    for axis in 0..3 {
        items.clear();
        for (i, &pi) in set.iter().enumerate() {
            let poly = &polygons[pi as usize];
            let mut mn = poly.point(0)[axis];
            let mut mx = mn;
            for p in &poly.points()[1..] {
                let v = p[axis];
                if v < mn {
                    mn = v;
                }
                if v > mx {
                    mx = v;
                }
            }
            items.push((mn, (i as u32) << 1));
            items.push((mx, ((i as u32) << 1) | 1));
        }
        items.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let c1 = (axis + 1) % 3;
        let c2 = (axis + 2) % 3;
        let e1 = aabb.max[c1] - aabb.min[c1];
        let e2 = aabb.max[c2] - aabb.min[c2];
        let area_const = 2.0 * e1 * e2;
        let area_factor = 2.0 * (e1 + e2);
        let bound_left = aabb.min[axis];
        let bound_right = aabb.max[axis];

        // Sweep: a min endpoint moves its polygon into the left count before
        // the cost is evaluated at that position, a max endpoint leaves the
        // right count after.
        let mut left = 0usize;
        let mut right = set.len();
        let mut axis_best: Option<(Real, Real)> = None;

        for &(v, key) in &items {
            if key & 1 == 0 {
                left += 1;
            }
            if v >= bound_right {
                break;
            }
            if v > bound_left {
                let a_left = area_const + area_factor * (v - bound_left);
                let a_right = area_const + area_factor * (bound_right - v);
                let cost = a_left * left as Real + a_right * right as Real;
                if axis_best.is_none_or(|(c, _)| cost < c) {
                    axis_best = Some((cost, v));
                }
            }
            if key & 1 == 1 {
                right -= 1;
            }
        }

        if let Some((cost, pos)) = axis_best {
            if cost > 0.0 && best.is_none_or(|(c, _, _)| cost < c) {
                best = Some((cost, axis, pos));
            }
        }
    }

    best.map(|(_, axis, pos)| (axis, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn quad(points: [[Real; 3]; 4], name: &str) -> Polygon {
        Polygon::new(
            points
                .iter()
                .map(|p| Point3::new(p[0], p[1], p[2]))
                .collect(),
            Material::default(),
            name,
        )
    }

    /// A 4 x 3 x 2.5 shoebox, inward-facing winding.
    fn shoebox() -> Vec<Polygon> {
        let (w, d, h) = (4.0, 3.0, 2.5);
        vec![
            quad([[0.0, 0.0, 0.0], [w, 0.0, 0.0], [w, d, 0.0], [0.0, d, 0.0]], "floor"),
            quad([[0.0, 0.0, h], [0.0, d, h], [w, d, h], [w, 0.0, h]], "ceiling"),
            quad([[0.0, 0.0, 0.0], [0.0, 0.0, h], [w, 0.0, h], [w, 0.0, 0.0]], "south"),
            quad([[0.0, d, 0.0], [w, d, 0.0], [w, d, h], [0.0, d, h]], "north"),
            quad([[0.0, 0.0, 0.0], [0.0, d, 0.0], [0.0, d, h], [0.0, 0.0, h]], "west"),
            quad([[w, 0.0, 0.0], [w, 0.0, h], [w, d, h], [w, d, 0.0]], "east"),
        ]
    }

    /// A shoebox plus interior clutter so the tree actually splits.
    fn cluttered_scene() -> Vec<Polygon> {
        let mut polys = shoebox();
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..40 {
            let cx = rng.gen_range(0.5..3.5);
            let cy = rng.gen_range(0.5..2.5);
            let cz = rng.gen_range(0.3..2.2);
            let s = rng.gen_range(0.05..0.3);
            polys.push(quad(
                [
                    [cx - s, cy - s, cz],
                    [cx + s, cy - s, cz],
                    [cx + s, cy + s, cz],
                    [cx - s, cy + s, cz],
                ],
                &format!("panel{i}"),
            ));
        }
        for (i, p) in polys.iter_mut().enumerate() {
            *p = p.clone().with_id(i as u64);
        }
        polys
    }

    fn shrunk(ray: &Ray, eps: Real) -> Ray {
        let ndir = eps * (ray.b - ray.a).normalize();
        Ray::new(ray.a + ndir, ray.b - ndir)
    }

    fn brute_force_any(ray: &Ray, polygons: &[Polygon], tol: &Tolerances) -> bool {
        let probe = shrunk(ray, tol.ray_ends);
        polygons.iter().any(|p| probe.intersects(p))
    }

    fn brute_force_nearest(ray: &Ray, polygons: &[Polygon], tol: &Tolerances) -> Option<u32> {
        let probe = shrunk(ray, tol.ray_ends);
        let dir = probe.b - probe.a;
        let mut best: Option<(Real, u32)> = None;
        for (i, poly) in polygons.iter().enumerate() {
            if !probe.intersects(poly) {
                continue;
            }
            let t = -poly.plane().eval(&probe.a) / dir.dot(&poly.plane().normal);
            if best.is_none_or(|(bt, _)| t < bt) {
                best = Some((t, i as u32));
            }
        }
        best.map(|(_, i)| i)
    }

    fn random_point(rng: &mut StdRng) -> Point3<Real> {
        Point3::new(
            rng.gen_range(-1.0..5.0),
            rng.gen_range(-1.0..4.0),
            rng.gen_range(-1.0..3.5),
        )
    }

    #[test]
    fn build_splits_cluttered_scene() {
        let polys = cluttered_scene();
        let tree = BspTree::build(&polys, Tolerances::default()).unwrap();
        assert!(tree.num_nodes() > 1);
        assert!(matches!(tree.nodes()[0], BspNode::Split { .. }));
    }

    #[test]
    fn empty_scene_is_rejected() {
        assert_eq!(
            BspTree::build(&[], Tolerances::default()).unwrap_err(),
            SolveError::EmptyRoom
        );
    }

    #[test]
    fn ray_cast_any_matches_brute_force() {
        let polys = cluttered_scene();
        let tol = Tolerances::default();
        let tree = BspTree::build(&polys, tol).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let mut hits = 0;
        for _ in 0..10_000 {
            let ray = Ray::new(random_point(&mut rng), random_point(&mut rng));
            if (ray.b - ray.a).norm() < 0.01 {
                continue;
            }
            let expected = brute_force_any(&ray, &polys, &tol);
            assert_eq!(tree.ray_cast_any(&ray, &polys), expected);
            if expected {
                hits += 1;
            }
        }
        // the sample must exercise both outcomes
        assert!(hits > 100);
    }

    #[test]
    fn ray_cast_matches_brute_force_nearest() {
        let polys = cluttered_scene();
        let tol = Tolerances::default();
        let tree = BspTree::build(&polys, tol).unwrap();
        let mut rng = StdRng::seed_from_u64(1234);

        for _ in 0..10_000 {
            let ray = Ray::new(random_point(&mut rng), random_point(&mut rng));
            if (ray.b - ray.a).norm() < 0.01 {
                continue;
            }
            let expected = brute_force_nearest(&ray, &polys, &tol);
            let got = tree.ray_cast(&ray, &polys).map(|h| h.polygon);
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn ray_hit_point_lies_on_polygon_plane() {
        let polys = shoebox();
        let tree = BspTree::build(&polys, Tolerances::default()).unwrap();
        let ray = Ray::new(Point3::new(2.0, 1.5, 1.0), Point3::new(2.0, 1.5, -1.0));
        let hit = tree.ray_cast(&ray, &polys).unwrap();
        assert_eq!(polys[hit.polygon as usize].name(), "floor");
        assert!(polys[hit.polygon as usize].plane().eval(&hit.point).abs() < 1e-6);
    }

    #[test]
    fn unbounded_beam_returns_whole_scene_once() {
        let polys = cluttered_scene();
        let tree = BspTree::build(&polys, Tolerances::default()).unwrap();
        let mut found = tree.beam_cast(&Beam::unbounded(), &polys);
        found.sort_unstable();
        let expected: Vec<u32> = (0..polys.len() as u32).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn beam_cast_is_conservative() {
        // Every polygon the beam's half-spaces accept must be reported; the
        // box test may over-report but never under-report.
        let polys = cluttered_scene();
        let tree = BspTree::build(&polys, Tolerances::default()).unwrap();

        let base = quad(
            [[1.5, 1.0, 2.0], [2.5, 1.0, 2.0], [2.5, 2.0, 2.0], [1.5, 2.0, 2.0]],
            "base",
        );
        let beam = Beam::new(Point3::new(2.0, 1.5, 0.5), base, 1e-3);
        let found = tree.beam_cast(&beam, &polys);

        for (i, poly) in polys.iter().enumerate() {
            let touches = poly.points().iter().any(|p| beam.contains(p));
            if touches {
                assert!(
                    found.contains(&(i as u32)),
                    "polygon {} with a vertex in the beam was not reported",
                    poly.name()
                );
            }
        }
    }
}
