//! Beams: pyramidal frusta spanned by an apex and a base polygon.

use crate::float_types::Real;
use crate::plane::Plane;
use crate::polygon::Polygon;
use nalgebra::Point3;

/// A beam is the solid angle spanned from an apex through a convex base
/// polygon, represented as the intersection of half-spaces.
///
/// Plane `0` is the base polygon's supporting plane; planes `1..` are the side
/// planes through the apex and each base edge. All planes are oriented so the
/// beam interior satisfies `eval >= 0`, which puts the apex on or behind every
/// side plane and strictly behind the base.
///
/// A beam with no planes is unbounded and contains every point; the solver
/// uses one as the root of the reflection recursion.
#[derive(Debug, Clone, PartialEq)]
pub struct Beam {
    apex: Point3<Real>,
    polygon: Option<Polygon>,
    planes: Vec<Plane>,
}

impl Beam {
    /// The beam containing all of space.
    pub fn unbounded() -> Self {
        Beam {
            apex: Point3::origin(),
            polygon: None,
            planes: Vec::new(),
        }
    }

    /// Span a beam from `apex` through `polygon`.
    ///
    /// The base polygon is dilated by the relative factor `expand_eps` before
    /// the side planes are derived, so geometry lying exactly on a beam
    /// boundary is kept rather than dropped. Without the dilation, paths that
    /// reflect at a shared polygon edge fall into a crack between the two
    /// neighbouring beams.
    pub fn new(apex: Point3<Real>, polygon: Polygon, expand_eps: Real) -> Self {
        let mut expanded = polygon.clone();
        expanded.expand(expand_eps);

        let n = expanded.num_points();
        let mut planes = Vec::with_capacity(n + 1);

        // Orient everything so the apex ends up on the negative side of the
        // base: the beam volume opens away from the apex.
        let sign = if polygon.plane().eval(&apex) > 0.0 {
            -1.0
        } else {
            1.0
        };

        let base = *polygon.plane();
        planes.push(if sign < 0.0 { -base } else { base });

        for i in 0..n {
            let p0 = expanded.point(i);
            let p1 = expanded.point((i + 1) % n);
            let side = Plane::from_points(&apex, p0, p1).normalize();
            planes.push(if sign < 0.0 { -side } else { side });
        }

        Beam {
            apex,
            polygon: Some(polygon),
            planes,
        }
    }

    pub const fn apex(&self) -> Point3<Real> {
        self.apex
    }

    pub const fn polygon(&self) -> Option<&Polygon> {
        self.polygon.as_ref()
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, i: usize) -> &Plane {
        &self.planes[i]
    }

    pub fn is_unbounded(&self) -> bool {
        self.planes.is_empty()
    }

    /// Is `p` inside the beam? Boundary points count as inside.
    pub fn contains(&self, p: &Point3<Real>) -> bool {
        self.planes.iter().all(|pleq| pleq.eval(p) >= 0.0)
    }
}
