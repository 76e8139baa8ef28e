//! End-to-end solver tests on small analytically checkable rooms.

mod support;

use beamtrace::{CancelToken, Path, PathSolution, Real, SolveWorker};
use nalgebra::Point3;
use support::{init_logging, occluded_room, shoebox_room};

fn source() -> Point3<Real> {
    Point3::new(1.0, 1.0, 1.0)
}

fn listener() -> Point3<Real> {
    Point3::new(3.0, 2.0, 1.5)
}

/// Stable comparison key: order plus length rounded well below the geometric
/// tolerances.
fn path_keys(paths: &[Path]) -> Vec<(usize, i64)> {
    let mut keys: Vec<(usize, i64)> = paths
        .iter()
        .map(|p| (p.order, (p.length() * 1e6).round() as i64))
        .collect();
    keys.sort_unstable();
    keys
}

#[test]
fn round_trip_direct_and_first_order() {
    init_logging();
    let room = shoebox_room();
    let mut solution = PathSolution::new(room, 1);
    solution
        .solve(&source(), &listener(), &CancelToken::new())
        .unwrap();
    solution.update(&listener()).unwrap();

    assert_eq!(solution.paths_with_order(0..=0).count(), 1);
    assert_eq!(solution.paths_with_order(1..=1).count(), 6);

    // The floor path must reflect at the analytic mirror point: the image
    // source (1,1,-1) connected to the listener crosses z = 0 at (1.8, 1.4).
    let floor_path = solution
        .paths_with_order(1..=1)
        .find(|p| solution.path_polygons(p)[0].name() == "floor")
        .expect("no floor reflection found");
    let refl = floor_path.points[1];
    assert!((refl - Point3::new(1.8, 1.4, 0.0)).norm() < 1e-6);

    // Mirror geometry: the path length equals the image-source distance.
    let image = Point3::new(1.0, 1.0, -1.0);
    assert!((floor_path.length() - (listener() - image).norm()).abs() < 1e-6);
}

#[test]
fn occlusion_removes_direct_path() {
    init_logging();
    let room = occluded_room();
    let mut solution = PathSolution::new(room, 1);
    solution
        .solve(&source(), &listener(), &CancelToken::new())
        .unwrap();
    solution.update(&listener()).unwrap();

    assert_eq!(solution.paths_with_order(0..=0).count(), 0);
    // The floor reflection passes under the screen and must survive.
    assert!(solution
        .paths_with_order(1..=1)
        .any(|p| solution.path_polygons(p)[0].name() == "floor"));
}

#[test]
fn update_is_idempotent() {
    init_logging();
    let room = shoebox_room();
    let mut solution = PathSolution::new(room, 2);
    solution
        .solve(&source(), &listener(), &CancelToken::new())
        .unwrap();

    solution.update(&listener()).unwrap();
    let first = path_keys(solution.paths());
    solution.update(&listener()).unwrap();
    assert_eq!(path_keys(solution.paths()), first);
}

#[test]
fn skip_spheres_do_not_change_results() {
    init_logging();
    // A solution that reuses its fail-plane and skip-sphere caches across a
    // listener trajectory must report the same paths as one solved fresh for
    // each position.
    let room = shoebox_room();
    let targets = [
        listener(),
        Point3::new(0.5, 0.5, 0.5),
        Point3::new(3.2, 0.8, 2.0),
        Point3::new(3.01, 2.0, 1.5),
        listener(),
    ];

    let mut cached = PathSolution::new(room.clone(), 2);
    cached
        .solve(&source(), &targets[0], &CancelToken::new())
        .unwrap();

    for target in &targets {
        cached.update(target).unwrap();

        let mut fresh = PathSolution::new(room.clone(), 2);
        fresh.solve(&source(), target, &CancelToken::new()).unwrap();
        fresh.update(target).unwrap();

        assert_eq!(
            path_keys(cached.paths()),
            path_keys(fresh.paths()),
            "cached update diverged at listener {target}"
        );
    }
}

#[test]
fn deeper_solve_keeps_shallow_paths() {
    init_logging();
    let room = shoebox_room();

    let mut shallow = PathSolution::new(room.clone(), 1);
    shallow
        .solve(&source(), &listener(), &CancelToken::new())
        .unwrap();
    shallow.update(&listener()).unwrap();

    let mut deep = PathSolution::new(room, 2);
    deep.solve(&source(), &listener(), &CancelToken::new())
        .unwrap();
    deep.update(&listener()).unwrap();

    let deep_keys = path_keys(deep.paths());
    for key in path_keys(shallow.paths()) {
        assert!(
            deep_keys.contains(&key),
            "order-{} path missing from deeper solve",
            key.0
        );
    }
    assert!(deep.num_paths() > shallow.num_paths());
}

#[test]
fn absorption_accumulates_along_path() {
    init_logging();
    let room = shoebox_room();
    let mut solution = PathSolution::new(room, 2);
    solution
        .solve(&source(), &listener(), &CancelToken::new())
        .unwrap();
    solution.update(&listener()).unwrap();

    // walls are uniform 0.1 absorption, so reflectance is 0.9^order
    for path in solution.paths() {
        let r = solution.path_reflectance(path);
        let expected = (0.9 as Real).powi(path.order as i32);
        assert!((r[0] - expected).abs() < 1e-9);
    }
}

#[test]
fn worker_round_trip() {
    init_logging();
    let room = shoebox_room();
    let solution = PathSolution::new(room, 2);

    let worker = SolveWorker::spawn(solution, source(), listener());
    let mut solved = worker.join().expect("worker published no solution");
    assert!(solved.is_solved());
    solved.update(&listener()).unwrap();
    assert!(solved.num_paths() > 0);
}

#[test]
fn cancelled_worker_publishes_nothing() {
    init_logging();
    let room = shoebox_room();
    let solution = PathSolution::new(room, 3);

    let cancel = CancelToken::new();
    cancel.cancel();
    let worker = SolveWorker::spawn_with_token(solution, source(), listener(), cancel);
    assert!(worker.join().is_none());
}
