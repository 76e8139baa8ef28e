//! Plane equations in `(normal, offset)` form.

use crate::float_types::Real;
use nalgebra::{Point3, Vector3};
use std::ops::Neg;

/// A plane equation `normal · p + offset = 0`.
///
/// The signed value [`Plane::eval`] is positive on the side the normal points
/// into; all containment tests in the crate treat `eval >= 0` as "inside".
/// Planes compared against distance thresholds must be normalized first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3<Real>,
    pub offset: Real,
}

impl Plane {
    pub const fn new(normal: Vector3<Real>, offset: Real) -> Self {
        Plane { normal, offset }
    }

    /// The plane through three points, normal following the right-hand rule
    /// `(b-a) × (c-a)`. The normal is **not** normalized; callers that need a
    /// unit normal apply [`Plane::normalize`].
    pub fn from_points(a: &Point3<Real>, b: &Point3<Real>, c: &Point3<Real>) -> Self {
        let normal = (b - a).cross(&(c - a));
        let offset = -normal.dot(&a.coords);
        Plane { normal, offset }
    }

    /// A degenerate plane whose evaluation is `+1` everywhere; used as the
    /// fail plane of an unconstrained beam so the root candidate always
    /// passes the cheap containment test.
    pub const fn always_pass() -> Self {
        Plane {
            normal: Vector3::new(0.0, 0.0, 0.0),
            offset: 1.0,
        }
    }

    /// Signed distance-like evaluation `normal · p + offset`. A true signed
    /// distance only when the normal is unit length.
    #[inline]
    pub fn eval(&self, p: &Point3<Real>) -> Real {
        self.normal.dot(&p.coords) + self.offset
    }

    /// Scale the equation so the normal has unit length. A zero normal is
    /// returned unchanged.
    pub fn normalize(&self) -> Plane {
        let len = self.normal.norm();
        if len == 0.0 {
            return *self;
        }
        let inv = 1.0 / len;
        Plane {
            normal: self.normal * inv,
            offset: self.offset * inv,
        }
    }

    /// Reflect a point across this plane. Requires a unit normal.
    #[inline]
    pub fn mirror_point(&self, p: &Point3<Real>) -> Point3<Real> {
        let d = 2.0 * self.eval(p);
        p - d * self.normal
    }

    /// Reflect a whole plane equation across `mirror`. Requires `mirror` to
    /// have a unit normal; the result keeps this plane's normal length.
    pub fn mirrored_across(&self, mirror: &Plane) -> Plane {
        let dpr = 2.0 * self.normal.dot(&mirror.normal);
        Plane {
            normal: self.normal - dpr * mirror.normal,
            offset: self.offset - dpr * mirror.offset,
        }
    }
}

impl Neg for Plane {
    type Output = Plane;

    fn neg(self) -> Plane {
        Plane {
            normal: -self.normal,
            offset: -self.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::float_types::EPSILON;

    #[test]
    fn from_points_winding() {
        // CCW triangle in the z=0 plane seen from +z: normal points up
        let p = Plane::from_points(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        )
        .normalize();
        assert!((p.normal - Vector3::z()).norm() < EPSILON);
        assert!(p.eval(&Point3::new(0.3, 0.3, 0.0)).abs() < EPSILON);
        assert!(p.eval(&Point3::new(0.0, 0.0, 2.0)) > 0.0);
    }

    #[test]
    fn mirror_point_round_trip() {
        let p = Plane::from_points(
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 1.0),
            &Point3::new(0.0, 1.0, 1.0),
        )
        .normalize();
        let v = Point3::new(0.2, -0.4, 3.0);
        let m = p.mirror_point(&v);
        assert!((m - Point3::new(0.2, -0.4, -1.0)).norm() < EPSILON);
        assert!((p.mirror_point(&m) - v).norm() < EPSILON);
    }

    #[test]
    fn mirror_plane_maps_points_consistently() {
        let mirror = Plane::from_points(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        )
        .normalize();
        let plane = Plane::from_points(
            &Point3::new(0.0, 0.0, 2.0),
            &Point3::new(1.0, 0.0, 3.0),
            &Point3::new(0.0, 1.0, 2.0),
        )
        .normalize();
        let reflected = plane.mirrored_across(&mirror);
        // Evaluating the reflected plane at a mirrored point matches
        // evaluating the original plane at the original point.
        let v = Point3::new(0.7, -0.2, 5.0);
        let mv = mirror.mirror_point(&v);
        assert!((reflected.eval(&mv) - plane.eval(&v)).abs() < 1e-6);
    }
}
