//! Deterministic rigid-body dynamics engine.
//!
//! This crate provides time-bounded force generators, integrators that
//! return state deltas, an impulse collider with restitution and Coulomb
//! friction, and a world that advances a scene from one impact to the next.
//! It builds on [`rbd_types`] for identities, inertia and configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Stepper                               │
//! │  Re-invokes the world until a frame is consumed             │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         World                                │
//! │  Frame segments, collision cache, impact ordering           │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │                             │
//!                 ▼                             ▼
//! ┌───────────────────────────────┐ ┌───────────────────────────┐
//! │  NarrowPhase                   │ │  Collider                  │
//! │  Time of impact, contact type │ │  Impulses, friction        │
//! └───────────────┬───────────────┘ └─────────────┬─────────────┘
//!                 │                               │
//!                 ▼                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 RigidBody + Integrators                      │
//! │  Euler, RK4 projections over aggregate forces               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Determinism
//!
//! Bodies are visited in identity order and simultaneous impacts are
//! processed by pair key, so two runs of the same scene produce the same
//! trajectory bit for bit.
//!
//! # Quick Start
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use rbd_core::{shapes, RigidBody, World, WorldConfig};
//!
//! let mut world = World::new(WorldConfig::zero_gravity()).unwrap();
//!
//! let left = world.add_moving_body(
//!     RigidBody::from_mesh(shapes::cube(1.0, Point3::new(-2.0, 0.0, 0.0)), 1.0)
//!         .unwrap()
//!         .with_velocity(Vector3::new(9.0, 0.0, 0.0)),
//! );
//! let right = world.add_moving_body(
//!     RigidBody::from_mesh(shapes::cube(1.0, Point3::new(2.0, 0.0, 0.0)), 1.0)
//!         .unwrap()
//!         .with_velocity(Vector3::new(-9.0, 0.0, 0.0)),
//! );
//!
//! world.advance_time(0.5).unwrap();
//!
//! // Restitution 0.5: each cube leaves at half its approach speed.
//! assert_eq!(world.collisions_resolved(), 1);
//! assert!((world.body(left).unwrap().velocity().x + 4.5).abs() < 1e-9);
//! assert!((world.body(right).unwrap().velocity().x - 4.5).abs() < 1e-9);
//! ```
//!
//! # Integration Methods
//!
//! | Method | Order | Evaluations | Best For |
//! |--------|-------|-------------|----------|
//! | Euler | 1 | 1 | Simple tests |
//! | RK4 | 4 | 4 | Default, speed-dependent forces |
//!
//! Both integrators return deltas rather than new states, so a body can be
//! projected to any time within a segment without committing to it.

#![doc(html_root_url = "https://docs.rs/rbd-core/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::float_cmp,                 // Exact comparisons against 0 and infinity are intended
    clippy::similar_names,             // a/b, v0/v1 pairs follow the math
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::many_single_char_names,    // Integrator stages read best with short names
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

pub mod body;
pub mod collider;
pub mod force;
pub mod integrators;
pub mod narrow_phase;
pub mod shapes;
pub mod tracking;
mod stepper;
mod world;

pub use body::{Projection, RigidBody};
pub use collider::{Collider, ImpulseReport, RigidBodyCollider};
pub use force::{AggregateForce, Force, ForceKind};
pub use integrators::{Euler, Integrator, RungeKutta4};
pub use narrow_phase::{AabbNarrowPhase, ContactPoint, NarrowPhase, Proximity, Resolution};
pub use shapes::TriangleMesh;
pub use stepper::{SimulationBuilder, StepReport, Stepper, StepperConfig};
pub use tracking::{CollisionInfo, FirstCollision, TrackingInfo};
pub use world::World;

// Re-export key types from rbd-types for convenience
pub use rbd_types::{
    make_pair_key, BodyId, CollisionType, InertiaTensor, InertiaTensorView, IntegrationMethod,
    PairKey, SimError, WorldConfig, EPSILON, STANDARD_GRAVITY, WELD_DISTANCE,
};
