//! Core types for deterministic rigid-body dynamics.
//!
//! This crate provides the data types shared by the dynamics engine:
//!
//! - [`BodyId`] and [`PairKey`] - Body identities and canonical pair keys
//! - [`InertiaTensor`] - Mass, center of mass and inertia tensor of a body
//! - [`InertiaTensorView`] - The tensor re-expressed under an orientation
//! - [`CollisionType`] - Classification of a pairwise collision test
//! - [`WorldConfig`] - Gravity, segment size, integration and contact settings
//!
//! # Design Philosophy
//!
//! These types carry no simulation loop. They are the common language
//! between force generators, integrators, the impulse collider and the
//! world orchestrator in `rbd-core`.
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: up (gravity points along -Y by default)
//! - Z: toward the viewer
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use rbd_types::{make_pair_key, BodyId, CollisionType};
//!
//! let key = make_pair_key(BodyId::new(7), BodyId::new(2));
//! assert_eq!(key.first(), BodyId::new(2));
//!
//! assert!(CollisionType::PossiblyColliding.is_uncertain());
//! assert_eq!(
//!     CollisionType::PossiblyColliding.to_certain(),
//!     CollisionType::Colliding
//! );
//! ```

#![doc(html_root_url = "https://docs.rs/rbd-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
    clippy::many_single_char_names,    // Tensor algebra reads best with short names
)]

mod body;
mod collision;
mod config;
mod error;
mod inertia;

pub use body::{make_pair_key, BodyId, PairKey};
pub use collision::CollisionType;
pub use config::{IntegrationMethod, WorldConfig, EPSILON, STANDARD_GRAVITY, WELD_DISTANCE};
pub use error::SimError;
pub use inertia::{invert_inertia_tensor, InertiaTensor, InertiaTensorView, SymmetricTensor};

// Re-export math types for convenience
pub use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
