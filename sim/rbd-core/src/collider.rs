//! Impulse-based collision response.
//!
//! A [`Collider`] turns one contact event between two bodies into velocity
//! changes. The contact normal always points from body B to body A, so
//! the relative point velocity `u = v_B(p) − v_A(p)` has a positive normal
//! component while the bodies approach.
//!
//! # Effective mass
//!
//! Every impulse below divides by the resistance of the pair to a unit
//! impulse applied along `b` and measured along `a`:
//!
//! ```text
//! K(a, b) = a · [ (1/m_A + 1/m_B) b + ((r_A × b) / I_A) × r_A + ((r_B × b) / I_B) × r_B ]
//! ```
//!
//! with `r` the lever from each center of mass to the contact point and `I`
//! the oriented inertia tensors. Immovable bodies contribute nothing.
//!
//! # Friction
//!
//! Friction and restitution draw on the same impulse. The tangential pass
//! picks the normal impulse as the smaller of the restitution impulse and
//! the impulse that would stop sliding outright, applies `μ·j` along the
//! sliding direction and `j` along the normal, and tops up the normal
//! impulse in a second pass when friction was the binding bound.
//!
//! When the lever couples the normal and tangential directions
//! (`K(t, n) ≠ 0`), the normal impulses also push the contact sideways. A
//! final correction then solves the full 3×3 effective-mass system for the
//! impulse that brings the contact velocity back inside the limits: no
//! faster or reversed slide, no approach and no faster separation than the
//! bodies came in with.

use nalgebra::{Matrix3, Point3, Vector3};
use rbd_types::{CollisionType, InertiaTensorView, EPSILON};
use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::body::RigidBody;

/// Impulse magnitudes applied while resolving one contact.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImpulseReport {
    /// Normal impulse applied in the first pass.
    pub normal: f64,
    /// Tangential (friction) impulse.
    pub friction: f64,
    /// Normal impulse that satisfies the restitution law on its own.
    pub max_reactive: f64,
    /// Normal impulse that would stop tangential sliding. Zero when no
    /// friction pass ran.
    pub max_friction: f64,
    /// Normal impulse applied in the second pass.
    pub second_pass: f64,
    /// Magnitude of the impulse that pulled the contact velocity back
    /// within the friction limits. Zero when none was needed.
    pub correction: f64,
}

impl ImpulseReport {
    /// Total normal impulse.
    #[must_use]
    pub fn total_normal(&self) -> f64 {
        self.normal + self.second_pass
    }

    /// Check whether any impulse was applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_normal() == 0.0 && self.friction == 0.0 && self.correction == 0.0
    }
}

/// Collision response strategy.
pub trait Collider: std::fmt::Debug {
    /// Resolve a contact between `a` and `b` at `point` with `normal`
    /// pointing from `b` to `a`.
    fn collide(
        &self,
        a: &mut RigidBody,
        b: &mut RigidBody,
        point: &Point3<f64>,
        normal: &Vector3<f64>,
        kind: CollisionType,
    ) -> ImpulseReport;

    /// Coulomb friction coefficient used for resting contact forces.
    fn friction(&self) -> f64 {
        0.0
    }
}

/// Impulse collider with restitution and Coulomb friction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBodyCollider {
    restitution: f64,
    friction: f64,
}

impl Default for RigidBodyCollider {
    fn default() -> Self {
        Self::new(0.5, 0.0)
    }
}

impl RigidBodyCollider {
    /// Create a collider. Restitution is clamped to `[0, 1]` and friction to
    /// be non-negative.
    #[must_use]
    pub fn new(restitution: f64, friction: f64) -> Self {
        Self {
            restitution: restitution.clamp(0.0, 1.0),
            friction: friction.max(0.0),
        }
    }

    /// Coefficient of restitution.
    #[must_use]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    fn resolve(
        &self,
        a: &mut RigidBody,
        b: &mut RigidBody,
        point: &Point3<f64>,
        normal: &Vector3<f64>,
        restitution: f64,
    ) -> ImpulseReport {
        let contact = Contact::new(a, b, point);
        let u = contact.relative_velocity(a, b);
        let u_n = u.dot(normal);
        if u_n <= 0.0 {
            return ImpulseReport::default();
        }

        let k_nn = contact.resistance(normal, normal);
        if !k_nn.is_finite() || k_nn <= EPSILON {
            return ImpulseReport::default();
        }
        let max_reactive = (1.0 + restitution) * u_n / k_nn;

        let tangential = u - normal * u_n;
        let slide_speed = tangential.norm();
        if self.friction <= 0.0 || slide_speed <= EPSILON {
            contact.apply(a, b, normal, max_reactive);
            trace!(impulse = max_reactive, "frictionless impulse");
            return ImpulseReport {
                normal: max_reactive,
                max_reactive,
                ..ImpulseReport::default()
            };
        }

        let t = tangential / slide_speed;
        let denominator = self.friction * contact.resistance(&t, &t) + contact.resistance(&t, normal);
        let max_friction = slide_speed / denominator;

        let chosen = if denominator <= 0.0 || !max_friction.is_finite() || max_friction < 0.0 {
            max_reactive
        } else {
            max_reactive.min(max_friction)
        };

        let friction = self.friction * chosen;
        contact.apply(a, b, &t, friction);
        contact.apply(a, b, normal, chosen);

        let mut second_pass = 0.0;
        if chosen < max_reactive {
            let u_n_now = contact.relative_velocity(a, b).dot(normal);
            let remainder = (u_n_now + restitution * u_n) / k_nn;
            if remainder > 0.0 {
                contact.apply(a, b, normal, remainder);
                second_pass = remainder;
            }
        }

        let correction = contact.limit_slide(a, b, normal, u_n, &tangential);

        trace!(
            normal = chosen,
            friction,
            max_reactive,
            max_friction,
            second_pass,
            correction,
            "frictional impulse"
        );

        ImpulseReport {
            normal: chosen,
            friction,
            max_reactive,
            max_friction,
            second_pass,
            correction,
        }
    }
}

impl Collider for RigidBodyCollider {
    fn collide(
        &self,
        a: &mut RigidBody,
        b: &mut RigidBody,
        point: &Point3<f64>,
        normal: &Vector3<f64>,
        kind: CollisionType,
    ) -> ImpulseReport {
        match kind {
            CollisionType::Colliding => self.resolve(a, b, point, normal, self.restitution),
            CollisionType::Sliding => self.resolve(a, b, point, normal, 0.0),
            CollisionType::None
            | CollisionType::PossiblySliding
            | CollisionType::PossiblyColliding => ImpulseReport::default(),
        }
    }

    fn friction(&self) -> f64 {
        self.friction
    }
}

/// Levers and oriented tensors of both bodies at one contact point.
struct Contact {
    point: Point3<f64>,
    lever_a: Vector3<f64>,
    lever_b: Vector3<f64>,
    view_a: InertiaTensorView,
    view_b: InertiaTensorView,
    inverse_mass_sum: f64,
}

impl Contact {
    fn new(a: &RigidBody, b: &RigidBody, point: &Point3<f64>) -> Self {
        Self {
            point: *point,
            lever_a: point - a.center_of_mass(),
            lever_b: point - b.center_of_mass(),
            view_a: a.inertia_view(),
            view_b: b.inertia_view(),
            inverse_mass_sum: a.inertia().inverse_mass() + b.inertia().inverse_mass(),
        }
    }

    fn relative_velocity(&self, a: &RigidBody, b: &RigidBody) -> Vector3<f64> {
        b.velocity_at(&self.point) - a.velocity_at(&self.point)
    }

    /// Change of `−u` per unit impulse along `dir`.
    fn response(&self, dir: &Vector3<f64>) -> Vector3<f64> {
        let rot_a = self.view_a.apply_inverse(&self.lever_a.cross(dir)).cross(&self.lever_a);
        let rot_b = self.view_b.apply_inverse(&self.lever_b.cross(dir)).cross(&self.lever_b);
        dir * self.inverse_mass_sum + rot_a + rot_b
    }

    fn resistance(&self, along: &Vector3<f64>, dir: &Vector3<f64>) -> f64 {
        along.dot(&self.response(dir))
    }

    /// Pull the relative contact velocity back within the limits set by the
    /// approach speed `u_n` and the slide `tangential` seen before any
    /// impulse. Returns the magnitude of the impulse applied.
    fn limit_slide(
        &self,
        a: &mut RigidBody,
        b: &mut RigidBody,
        normal: &Vector3<f64>,
        u_n: f64,
        tangential: &Vector3<f64>,
    ) -> f64 {
        let u = self.relative_velocity(a, b);
        let u_n_now = u.dot(normal);
        let slide_now = u - normal * u_n_now;
        let slide_limit = tangential.norm();

        let target_n = u_n_now.clamp(-u_n, 0.0);
        let target_slide = if slide_now.dot(tangential) < 0.0 {
            Vector3::zeros()
        } else if slide_now.norm() > slide_limit {
            slide_now * (slide_limit / slide_now.norm())
        } else {
            slide_now
        };

        let excess = u - (normal * target_n + target_slide);
        if excess.norm() <= EPSILON * EPSILON {
            return 0.0;
        }

        let response = Matrix3::from_columns(&[
            self.response(&Vector3::x()),
            self.response(&Vector3::y()),
            self.response(&Vector3::z()),
        ]);
        let Some(inverse) = response.try_inverse() else {
            return 0.0;
        };

        let impulse = inverse * excess;
        let magnitude = impulse.norm();
        if !magnitude.is_finite() || magnitude == 0.0 {
            return 0.0;
        }
        self.apply(a, b, &(impulse / magnitude), magnitude);
        magnitude
    }

    /// Apply `+magnitude · dir` to `a` and `−magnitude · dir` to `b`.
    fn apply(&self, a: &mut RigidBody, b: &mut RigidBody, dir: &Vector3<f64>, magnitude: f64) {
        if magnitude == 0.0 {
            return;
        }
        let multiplier_a = self.view_a.apply_inverse(&self.lever_a.cross(dir));
        let multiplier_b = self.view_b.apply_inverse(&self.lever_b.cross(dir));
        a.apply_directed_impulse(dir, &multiplier_a, magnitude);
        b.apply_directed_impulse(dir, &multiplier_b, -magnitude);
    }
}
