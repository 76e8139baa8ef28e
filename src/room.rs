//! Room geometry: element polygons, their convex decomposition, the spatial
//! index built over it, and source/listener pose records.

use crate::aabb::Aabb;
use crate::bsp::BspTree;
use crate::errors::SolveError;
use crate::float_types::{Real, Tolerances};
use crate::polygon::Polygon;
use log::info;
use nalgebra::{Point3, Rotation3, Vector3};

/// A sound source pose.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub name: String,
    pub position: Point3<Real>,
    pub orientation: Rotation3<Real>,
}

impl Source {
    pub fn new(name: impl Into<String>, position: Point3<Real>) -> Self {
        Source {
            name: name.into(),
            position,
            orientation: Rotation3::identity(),
        }
    }

    pub fn direction(&self) -> Vector3<Real> {
        self.orientation * Vector3::z()
    }

    pub fn up(&self) -> Vector3<Real> {
        self.orientation * Vector3::y()
    }

    pub fn right(&self) -> Vector3<Real> {
        self.orientation * Vector3::x()
    }
}

/// A listener pose.
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub name: String,
    pub position: Point3<Real>,
    pub orientation: Rotation3<Real>,
}

impl Listener {
    pub fn new(name: impl Into<String>, position: Point3<Real>) -> Self {
        Listener {
            name: name.into(),
            position,
            orientation: Rotation3::identity(),
        }
    }

    pub fn direction(&self) -> Vector3<Real> {
        self.orientation * Vector3::z()
    }

    pub fn up(&self) -> Vector3<Real> {
        self.orientation * Vector3::y()
    }

    pub fn right(&self) -> Vector3<Real> {
        self.orientation * Vector3::x()
    }
}

/// A finished room: the input elements (possibly concave), the convex parts
/// the solver actually works on, and the BSP built over them.
///
/// Construction is the "geometry finished" step; there are no incremental
/// geometry edits. Changing the geometry means building a new `Room`, which
/// keeps the index and the convex decomposition trivially consistent. Sources
/// and listeners are mutable pose records and do not touch the index.
#[derive(Debug, Clone)]
pub struct Room {
    elements: Vec<Polygon>,
    convex: Vec<Polygon>,
    sources: Vec<Source>,
    listeners: Vec<Listener>,
    bsp: BspTree,
    tol: Tolerances,
}

impl Room {
    /// Split every element into convex parts and build the index.
    ///
    /// Convex parts keep their element's material, id and name, and are
    /// re-numbered sequentially so the solver can refer to them by dense
    /// index.
    pub fn new(elements: Vec<Polygon>, tol: Tolerances) -> Result<Room, SolveError> {
        let mut convex = Vec::with_capacity(elements.len());
        let mut max_planar_error: Real = 0.0;
        for elem in &elements {
            max_planar_error = max_planar_error.max(elem.non_planarity());
            convex.extend(elem.split_convex());
        }
        for (i, part) in convex.iter_mut().enumerate() {
            *part = part.clone().with_id(i as u64);
        }

        let bsp = BspTree::build(&convex, tol)?;
        info!(
            "room built: {} elements, {} convex parts, {} bsp nodes, max planar error {:.2e}",
            elements.len(),
            convex.len(),
            bsp.num_nodes(),
            max_planar_error
        );

        Ok(Room {
            elements,
            convex,
            sources: Vec::new(),
            listeners: Vec::new(),
            bsp,
            tol,
        })
    }

    pub fn elements(&self) -> &[Polygon] {
        &self.elements
    }

    /// The convex parts the solver and the index refer to by position.
    pub fn convex_polygons(&self) -> &[Polygon] {
        &self.convex
    }

    pub const fn bsp(&self) -> &BspTree {
        &self.bsp
    }

    pub const fn tolerances(&self) -> &Tolerances {
        &self.tol
    }

    pub fn add_source(&mut self, source: Source) {
        self.sources.push(source);
    }

    pub fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub fn source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn listener(&self, name: &str) -> Option<&Listener> {
        self.listeners.iter().find(|l| l.name == name)
    }

    /// Move a source by name; `false` when the name is unknown.
    pub fn set_source_position(&mut self, name: &str, position: Point3<Real>) -> bool {
        match self.sources.iter_mut().find(|s| s.name == name) {
            Some(s) => {
                s.position = position;
                true
            },
            None => false,
        }
    }

    /// Move a listener by name; `false` when the name is unknown.
    pub fn set_listener_position(&mut self, name: &str, position: Point3<Real>) -> bool {
        match self.listeners.iter_mut().find(|l| l.name == name) {
            Some(l) => {
                l.position = position;
                true
            },
            None => false,
        }
    }

    pub fn bounding_box(&self) -> &Aabb {
        self.bsp.aabb()
    }

    pub fn center(&self) -> Point3<Real> {
        self.bsp.aabb().center()
    }

    /// Length of the bounding box diagonal; a useful scale reference for
    /// choosing movement thresholds.
    pub fn max_length(&self) -> Real {
        let aabb = self.bsp.aabb();
        (aabb.max - aabb.min).norm()
    }
}
