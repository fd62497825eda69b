//! End-to-end scenarios for the world orchestrator.
//!
//! Each test builds a small scene from cubes and a ground slab, drives it
//! through the public API and checks the trajectory against closed-form
//! kinematics.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::float_cmp)]

use approx::assert_relative_eq;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rbd_core::shapes::{cube, cuboid};
use rbd_core::{
    BodyId, CollisionType, RigidBody, RigidBodyCollider, Stepper, StepperConfig, World,
    WorldConfig, EPSILON, STANDARD_GRAVITY, WELD_DISTANCE,
};

fn ground() -> RigidBody {
    RigidBody::immovable(cuboid(Vector3::new(50.0, 0.5, 50.0)).translated(Vector3::new(0.0, -0.5, 0.0)))
        .expect("ground mesh")
        .with_name("ground")
}

fn unit_cube(center: Point3<f64>, velocity: Vector3<f64>) -> RigidBody {
    RigidBody::from_mesh(cube(1.0, center), 1.0)
        .expect("cube mesh")
        .with_velocity(velocity)
}

/// Time for a face resting `height` above the ground to close to the weld
/// distance under gravity.
fn drop_time(height: f64) -> f64 {
    (2.0 * (height - WELD_DISTANCE) / STANDARD_GRAVITY).sqrt()
}

// =============================================================================
// Two cubes colliding mid-air, then landing
// =============================================================================

struct TwoCubes {
    world: World,
    left: BodyId,
    right: BodyId,
}

fn two_cubes() -> TwoCubes {
    let mut world = World::default();
    world.add_body(ground());
    let left = world.add_moving_body(unit_cube(Point3::new(-2.0, 5.0, 0.0), Vector3::new(9.0, 0.0, 0.0)));
    let right = world.add_moving_body(unit_cube(Point3::new(2.0, 5.0, 0.0), Vector3::new(-9.0, 0.0, 0.0)));
    TwoCubes { world, left, right }
}

#[test]
fn cubes_bounce_off_each_other() {
    let TwoCubes {
        mut world,
        left,
        right,
    } = two_cubes();
    let impact = (3.0 - WELD_DISTANCE) / 18.0;

    let report = Stepper::new().run_for(&mut world, 0.5).unwrap();
    assert_relative_eq!(report.elapsed, 0.5, epsilon = 1e-12);
    assert_eq!(report.collisions, 1);

    let l = world.body(left).unwrap();
    let r = world.body(right).unwrap();
    assert_relative_eq!(l.velocity().x, -4.5, epsilon = 1e-9);
    assert_relative_eq!(r.velocity().x, 4.5, epsilon = 1e-9);
    assert_relative_eq!(l.center_of_mass().x, -2.0 + 9.0 * impact - 4.5 * (0.5 - impact), epsilon = 1e-6);
    assert_relative_eq!(r.center_of_mass().x, -l.center_of_mass().x, epsilon = 1e-9);

    // The impact is horizontal; gravity acts alone on the vertical.
    assert_relative_eq!(l.velocity().y, -STANDARD_GRAVITY * 0.5, epsilon = 1e-9);
    assert_relative_eq!(l.angular_velocity().norm(), 0.0, epsilon = 1e-9);
    assert_relative_eq!(world.total_momentum().x, 0.0, epsilon = 1e-9);
}

#[test]
fn cubes_land_together() {
    let TwoCubes {
        mut world,
        left,
        right,
    } = two_cubes();
    let landing = drop_time(4.5);
    let stepper = Stepper::new();

    stepper.run_for(&mut world, landing - 0.05).unwrap();
    assert_eq!(world.collisions_resolved(), 1);

    stepper.run_for(&mut world, 0.1).unwrap();
    assert_eq!(world.collisions_resolved(), 3);

    let after = 0.5 * STANDARD_GRAVITY * landing - STANDARD_GRAVITY * 0.05;
    for id in [left, right] {
        let body = world.body(id).unwrap();
        assert_relative_eq!(body.velocity().y, after, epsilon = 1e-6);
        assert_relative_eq!(body.velocity().x.abs(), 4.5, epsilon = 1e-9);
    }
}

// =============================================================================
// Settling
// =============================================================================

#[test]
fn dropped_cube_comes_to_rest() {
    let mut world = World::default();
    world.add_body(ground());
    let id = world.add_moving_body(unit_cube(Point3::new(0.0, 1.5, 0.0), Vector3::zeros()));

    Stepper::new().run_for(&mut world, 3.0).unwrap();

    let body = world.body(id).unwrap();
    assert!(world.collisions_resolved() >= 3);
    assert!(body.speed() < 1e-6, "still moving at {}", body.speed());
    assert!((body.center_of_mass().y - 0.5).abs() <= 2.0 * WELD_DISTANCE);
}

#[test]
fn inelastic_pair_override_stops_bounce() {
    let mut world = World::default();
    let g = world.add_body(ground());
    let id = world.add_moving_body(unit_cube(Point3::new(0.0, 1.5, 0.0), Vector3::zeros()));
    world
        .set_pair_collider(g, id, Box::new(RigidBodyCollider::new(0.0, 0.0)))
        .unwrap();

    Stepper::new().run_for(&mut world, drop_time(1.0) + 0.5).unwrap();

    assert_eq!(world.collisions_resolved(), 1);
    let body = world.body(id).unwrap();
    assert!(body.speed() < 1e-6);
    assert_eq!(world.get_collision(id, g).unwrap().kind(), CollisionType::Sliding);
}

#[test]
fn resting_cube_carries_friction() {
    let mut world = World::new(WorldConfig::default().materials(0.0, 0.4)).unwrap();
    world.add_body(ground());
    let id = world.add_moving_body(unit_cube(Point3::new(0.0, 0.5, 0.0), Vector3::zeros()));
    world.set_velocity(id, Vector3::new(0.0, 0.0, 1.0)).unwrap();

    // μg ≈ 3.92 m/s²: the slide stops after about 0.255 s and 0.128 m.
    let mut stepper = Stepper::with_config(StepperConfig::default().with_frame_time(0.02));
    stepper.run(&mut world, 50).unwrap();

    let body = world.body(id).unwrap();
    assert!(body.speed() < 1e-6);
    let travelled = body.center_of_mass().z;
    assert!(travelled > 0.1 && travelled < 0.2, "travelled {travelled}");
    assert_relative_eq!(body.center_of_mass().y, 0.5, epsilon = 2.0 * WELD_DISTANCE);
}

// =============================================================================
// Tumbling
// =============================================================================

/// Deepest a landed body may sit below the ground surface.
const SINK_TOLERANCE: f64 = 0.05;

fn tumbling_scene() -> (World, BodyId) {
    let mut world = World::new(WorldConfig::default().materials(0.5, 0.5)).unwrap();
    world.add_body(ground());
    let id = world.add_moving_body(
        unit_cube(Point3::new(0.0, 2.0, 0.0), Vector3::new(1.0, 0.0, 0.0))
            .with_orientation(UnitQuaternion::from_euler_angles(0.3, 0.2, 0.4))
            .with_angular_velocity(Vector3::new(1.0, 2.0, 0.5)),
    );
    (world, id)
}

fn lowest_point(world: &World, id: BodyId) -> f64 {
    world
        .body(id)
        .unwrap()
        .vertices()
        .iter()
        .map(|p| p.y)
        .fold(f64::INFINITY, f64::min)
}

#[test]
fn tumbling_cube_lands_on_ground() {
    let (mut world, id) = tumbling_scene();

    let report = Stepper::new().run_for(&mut world, 3.0).unwrap();

    assert_relative_eq!(report.elapsed, 3.0, epsilon = 1e-9);
    assert!(report.collisions >= 1);
    let lowest = lowest_point(&world, id);
    assert!(lowest > -SINK_TOLERANCE, "sank to {lowest}");

    let body = world.body(id).unwrap();
    assert!(body.center_of_mass().y > 0.5 - SINK_TOLERANCE);
    // Free fall from the drop height would be doing about 7 m/s by now.
    assert!(body.velocity().y.abs() < 2.0, "vy = {}", body.velocity().y);
}

#[test]
fn tumbling_cube_advances_in_short_frames() {
    let (mut world, id) = tumbling_scene();

    let mut elapsed = 0.0;
    let mut calls = 0_usize;
    while elapsed < 3.0 - EPSILON {
        let advanced = world.advance_time(0.01).unwrap();
        assert!(advanced > EPSILON, "stalled at t = {elapsed}");
        elapsed += advanced;
        calls += 1;
        assert!(calls < 100_000, "too many calls to reach t = 3");

        let lowest = lowest_point(&world, id);
        assert!(lowest > -SINK_TOLERANCE, "sank to {lowest} at t = {elapsed}");
    }

    assert!(calls >= 300);
    assert_relative_eq!(world.elapsed_time(), elapsed, epsilon = 1e-9);
    assert!(world.body(id).unwrap().center_of_mass().y > 0.5 - SINK_TOLERANCE);
}

// =============================================================================
// Collision cache
// =============================================================================

#[test]
fn cache_grows_with_tested_pairs_only() {
    let mut world = World::new(WorldConfig::zero_gravity()).unwrap();
    let statics: Vec<BodyId> = (0..3)
        .map(|i| world.add_body(unit_cube(Point3::new(10.0 * f64::from(i), 0.0, 0.0), Vector3::zeros())))
        .collect();

    // Static pairs are never tested.
    for &a in &statics {
        for &b in &statics {
            assert!(world.get_collision(a, b).is_none());
        }
    }

    let mover = world.add_moving_body(unit_cube(Point3::new(0.0, 5.0, 0.0), Vector3::zeros()));
    for &s in &statics {
        let forward = world.get_collision(mover, s).unwrap();
        let backward = world.get_collision(s, mover).unwrap();
        assert_eq!(forward.kind(), CollisionType::None);
        assert_eq!(backward.kind(), CollisionType::None);
        assert_eq!(forward.time(), f64::INFINITY);
    }
    assert_eq!(world.collision_count(), 0);
}

#[test]
fn cached_normals_point_at_the_owner() {
    let mut world = World::new(WorldConfig::zero_gravity()).unwrap();
    let a = world.add_moving_body(unit_cube(Point3::new(0.0, 0.0, 0.0), Vector3::zeros()));
    let b = world.add_moving_body(unit_cube(Point3::new(1.0, 0.0, 0.0), Vector3::zeros()));

    let ab = world.get_collision(a, b).unwrap();
    let ba = world.get_collision(b, a).unwrap();
    assert_eq!(ab.kind(), CollisionType::Sliding);
    assert_relative_eq!(ab.normal(), -Vector3::x());
    assert_relative_eq!(ba.normal(), Vector3::x());
    assert_relative_eq!(ab.point(), ba.point());
    assert_eq!(world.collision_count(), 1);
}

#[test]
fn velocity_change_invalidates_stale_results() {
    let mut world = World::new(WorldConfig::zero_gravity()).unwrap();
    let a = world.add_moving_body(unit_cube(Point3::new(-2.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)));
    let b = world.add_moving_body(unit_cube(Point3::new(2.0, 0.0, 0.0), Vector3::zeros()));

    world.advance_time(0.5).unwrap();
    assert_eq!(world.collisions_resolved(), 0);

    // Reversing A must not leave a cached impact behind.
    world.set_velocity(a, Vector3::new(-1.0, 0.0, 0.0)).unwrap();
    assert_eq!(world.get_collision(a, b).unwrap().kind(), CollisionType::None);

    world.advance_time(5.0).unwrap();
    assert_eq!(world.collisions_resolved(), 0);
    assert_relative_eq!(world.body(a).unwrap().center_of_mass().x, -2.0 + 0.5 - 5.0, epsilon = 1e-9);
}

// =============================================================================
// Body lifecycle
// =============================================================================

#[test]
fn removed_body_stops_colliding() {
    let mut world = World::new(WorldConfig::zero_gravity()).unwrap();
    let a = world.add_moving_body(unit_cube(Point3::new(-2.0, 0.0, 0.0), Vector3::new(4.0, 0.0, 0.0)));
    let b = world.add_moving_body(unit_cube(Point3::new(2.0, 0.0, 0.0), Vector3::zeros()));

    world.advance_time(0.25).unwrap();
    world.remove_body(b).unwrap();
    assert_eq!(world.body_count(), 1);
    assert!(world.get_collision(a, b).is_none());

    world.advance_time(1.0).unwrap();
    assert_eq!(world.collisions_resolved(), 0);
    assert_relative_eq!(world.body(a).unwrap().velocity().x, 4.0);

    // Identities are not reused.
    let c = world.add_moving_body(unit_cube(Point3::new(20.0, 0.0, 0.0), Vector3::zeros()));
    assert!(c > b);
}

#[test]
fn scene_triangles_follow_bodies() {
    let mut world = World::new(WorldConfig::zero_gravity()).unwrap();
    world.add_moving_body(unit_cube(Point3::origin(), Vector3::new(1.0, 0.0, 0.0)));

    world.advance_time(2.0).unwrap();

    let triangles = world.scene_triangles();
    assert_eq!(triangles.len(), 12);
    let min_x = triangles
        .iter()
        .flat_map(|t| t.iter().map(|p| p.x))
        .fold(f64::INFINITY, f64::min);
    assert_relative_eq!(min_x, 1.5, epsilon = 1e-9);
}
