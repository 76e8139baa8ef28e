//! Shared room builders for the integration tests.

use beamtrace::{Listener, Material, MaterialLibrary, Polygon, Real, Room, Source, Tolerances};
use nalgebra::Point3;
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn quad(points: [[Real; 3]; 4], material: Material, name: &str) -> Polygon {
    Polygon::new(
        points
            .iter()
            .map(|p| Point3::new(p[0], p[1], p[2]))
            .collect(),
        material,
        name,
    )
}

/// The six walls of a `w x d x h` box with its corner at the origin.
pub fn shoebox_walls(w: Real, d: Real, h: Real, material: Material) -> Vec<Polygon> {
    vec![
        quad([[0.0, 0.0, 0.0], [w, 0.0, 0.0], [w, d, 0.0], [0.0, d, 0.0]], material, "floor"),
        quad([[0.0, 0.0, h], [0.0, d, h], [w, d, h], [w, 0.0, h]], material, "ceiling"),
        quad([[0.0, 0.0, 0.0], [0.0, 0.0, h], [w, 0.0, h], [w, 0.0, 0.0]], material, "south"),
        quad([[0.0, d, 0.0], [w, d, 0.0], [w, d, h], [0.0, d, h]], material, "north"),
        quad([[0.0, 0.0, 0.0], [0.0, d, 0.0], [0.0, d, h], [0.0, 0.0, h]], material, "west"),
        quad([[w, 0.0, 0.0], [w, 0.0, h], [w, d, h], [w, d, 0.0]], material, "east"),
    ]
}

pub fn materials() -> MaterialLibrary {
    let mut lib = MaterialLibrary::new();
    lib.insert("plaster", Material::uniform(0.1));
    lib.insert("screen", Material::uniform(0.9));
    lib
}

/// A 4 x 3 x 2.5 room with a source and a listener already placed.
pub fn shoebox_room() -> Arc<Room> {
    let mut room = Room::new(
        shoebox_walls(4.0, 3.0, 2.5, materials().get("plaster")),
        Tolerances::default(),
    )
    .unwrap();
    room.add_source(Source::new("src", Point3::new(1.0, 1.0, 1.0)));
    room.add_listener(Listener::new("lst", Point3::new(3.0, 2.0, 1.5)));
    Arc::new(room)
}

/// The shoebox with an extra panel blocking the straight line between the
/// default source and listener.
pub fn occluded_room() -> Arc<Room> {
    let lib = materials();
    let mut walls = shoebox_walls(4.0, 3.0, 2.5, lib.get("plaster"));
    // the segment (1,1,1)-(3,2,1.5) passes near (2, 1.5, 1.25)
    walls.push(quad(
        [[1.4, 1.5, 0.4], [2.6, 1.5, 0.4], [2.6, 1.5, 2.1], [1.4, 1.5, 2.1]],
        lib.get("screen"),
        "screen",
    ));
    let mut room = Room::new(walls, Tolerances::default()).unwrap();
    room.add_source(Source::new("src", Point3::new(1.0, 1.0, 1.0)));
    room.add_listener(Listener::new("lst", Point3::new(3.0, 2.0, 1.5)));
    Arc::new(room)
}
