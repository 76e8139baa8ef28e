//! Finite ray segments and segment/polygon intersection predicates.

use crate::float_types::Real;
use crate::plane::Plane;
use crate::polygon::Polygon;
use nalgebra::Point3;

/// A finite segment from `a` to `b`.
///
/// The solver only ever asks about segments (source to image, listener to
/// reflection point), never about half-infinite rays, so both endpoints are
/// first-class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub a: Point3<Real>,
    pub b: Point3<Real>,
}

impl Ray {
    pub const fn new(a: Point3<Real>, b: Point3<Real>) -> Self {
        Ray { a, b }
    }

    /// Does the open segment cross the polygon's interior?
    ///
    /// The endpoints must straddle the supporting plane strictly; a segment
    /// that starts or ends on the plane does not count as crossing. The
    /// in-polygon part is the signed-volume fan test of
    /// [`Ray::intersects_loop`].
    pub fn intersects(&self, polygon: &Polygon) -> bool {
        let s0 = polygon.plane().eval(&self.a);
        let s1 = polygon.plane().eval(&self.b);
        if s0 * s1 >= 0.0 {
            return false;
        }
        self.intersects_loop(polygon)
    }

    /// Does the line through the segment pass inside the polygon's vertex
    /// loop? Unlike [`Ray::intersects`] this skips the plane straddle test,
    /// which is what path validation needs once the side test has already
    /// been handled separately.
    ///
    /// The test checks that the signed volumes `dir · (v_i × v_{i+1})`, with
    /// vertices taken relative to `a`, never change sign around the loop.
    /// Boundary grazing (a zero volume) is accepted.
    pub fn intersects_loop(&self, polygon: &Polygon) -> bool {
        let n = polygon.num_points();
        if n < 3 {
            return false;
        }
        let dir = self.b - self.a;
        let mut sign = 0i32;
        let mut v0 = polygon.point(n - 1) - self.a;
        for p in polygon.points() {
            let v1 = p - self.a;
            let det = dir.dot(&v0.cross(&v1));
            if det > 0.0 {
                if sign < 0 {
                    return false;
                }
                sign = 1;
            } else if det < 0.0 {
                if sign > 0 {
                    return false;
                }
                sign = -1;
            }
            v0 = v1;
        }
        true
    }

    /// The point where the segment's supporting line meets a plane. The
    /// caller guarantees the endpoints evaluate to different values.
    pub fn intersection_with(&self, plane: &Plane) -> Point3<Real> {
        let s0 = plane.eval(&self.a);
        let s1 = plane.eval(&self.b);
        let t = s0 / (s0 - s1);
        self.a + t * (self.b - self.a)
    }
}
