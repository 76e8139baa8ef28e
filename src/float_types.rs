//! Scalar type selection and the geometric tolerance set.

// Our Real scalar type:
#[cfg(feature = "f32")]
pub type Real = f32;
#[cfg(feature = "f64")]
pub type Real = f64;

/// A small positive value used for generic "effectively zero" comparisons.
#[cfg(feature = "f32")]
pub const EPSILON: Real = 1e-4;
/// A small positive value used for generic "effectively zero" comparisons.
#[cfg(feature = "f64")]
pub const EPSILON: Real = 1e-8;

/// Tunable geometric tolerances.
///
/// Shared-edge geometry makes zero tolerance actively wrong: rays grazing a
/// polygon boundary would both miss real hits and double-count polygons
/// replicated into sibling BSP cells. The defaults below are the empirically
/// tuned reference values; every instance of the index and the solver carries
/// its own copy, so two rooms with different scales can use different sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Shrink applied to both ends of an occlusion ray, so that a segment
    /// starting or ending exactly on a polygon does not hit it.
    pub ray_ends: Real,
    /// Inflation of the scene bounding box, keeping polygons on the hull of
    /// the scene inside the root BSP cell.
    pub bounding_box: Real,
    /// Inflation of a BSP child cell when deciding whether a polygon copy
    /// survives clipping into it.
    pub poly_box_overlap: Real,
    /// Slack on the ray-parameter window when searching for the nearest
    /// polygon intersection.
    pub isect_polygon: Real,
    /// Slack on enter/exit distance comparisons during BSP traversal.
    pub distance: Real,
    /// Two reflection paths whose interior points all lie within this
    /// distance of each other are the same path.
    pub similar_paths: Real,
    /// Clipped polygons with less area than this do not spawn child beams.
    pub degenerate_area: Real,
    /// Relative dilation of a beam's base polygon about its centroid, closing
    /// hairline gaps between adjacent beams.
    pub expand_beam: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            ray_ends: 1e-3,
            bounding_box: 1e-3,
            poly_box_overlap: 1e-3,
            isect_polygon: 1e-8,
            distance: 1e-8,
            similar_paths: 1e-5,
            degenerate_area: 1e-8,
            expand_beam: 1e-3,
        }
    }
}
