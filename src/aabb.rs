//! Axis-aligned bounding boxes.

use crate::float_types::Real;
use nalgebra::{Point3, Vector3};

/// An axis-aligned box spanning `min..max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<Real>,
    pub max: Point3<Real>,
}

impl Aabb {
    pub const fn new(min: Point3<Real>, max: Point3<Real>) -> Self {
        Aabb { min, max }
    }

    /// A degenerate box containing exactly one point.
    pub const fn from_point(p: Point3<Real>) -> Self {
        Aabb { min: p, max: p }
    }

    /// The smallest box containing every point of the iterator, or `None`
    /// when the iterator is empty.
    pub fn from_points<I: IntoIterator<Item = Point3<Real>>>(points: I) -> Option<Self> {
        let mut it = points.into_iter();
        let first = it.next()?;
        let mut aabb = Aabb::from_point(first);
        for p in it {
            aabb.grow(&p);
        }
        Some(aabb)
    }

    /// Extend the box to contain `p`.
    pub fn grow(&mut self, p: &Point3<Real>) {
        for i in 0..3 {
            if p[i] < self.min[i] {
                self.min[i] = p[i];
            }
            if p[i] > self.max[i] {
                self.max[i] = p[i];
            }
        }
    }

    /// Extend the box to contain `other`.
    pub fn union(&mut self, other: &Aabb) {
        self.grow(&other.min);
        self.grow(&other.max);
    }

    /// Strict interior overlap test.
    pub fn overlaps(&self, o: &Aabb) -> bool {
        self.min.x < o.max.x
            && self.max.x > o.min.x
            && self.min.y < o.max.y
            && self.max.y > o.min.y
            && self.min.z < o.max.z
            && self.max.z > o.min.z
    }

    /// Strict interior containment test.
    pub fn contains(&self, p: &Point3<Real>) -> bool {
        p.x > self.min.x
            && p.x < self.max.x
            && p.y > self.min.y
            && p.y < self.max.y
            && p.z > self.min.z
            && p.z < self.max.z
    }

    pub fn center(&self) -> Point3<Real> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn half_extent(&self) -> Vector3<Real> {
        (self.max - self.min) * 0.5
    }

    /// Grow the box by `eps` on every side.
    pub fn inflate(&mut self, eps: Real) {
        let d = Vector3::repeat(eps);
        self.min -= d;
        self.max += d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_and_contains() {
        let mut aabb = Aabb::from_point(Point3::new(0.0, 0.0, 0.0));
        aabb.grow(&Point3::new(1.0, 2.0, 3.0));
        assert!(aabb.contains(&Point3::new(0.5, 1.0, 1.5)));
        assert!(!aabb.contains(&Point3::new(0.5, 1.0, 3.5)));
        // boundary points are outside
        assert!(!aabb.contains(&Point3::new(0.0, 1.0, 1.5)));
    }

    #[test]
    fn overlap_is_strict() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        assert!(!a.overlaps(&b));
        let c = Aabb::new(Point3::new(0.9, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        assert!(a.overlaps(&c));
    }
}
