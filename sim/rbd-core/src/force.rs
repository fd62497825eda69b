//! Time-bounded force generators and their aggregation.
//!
//! A [`Force`] pairs a closed [`ForceKind`] with an application point
//! (offset from the center of mass) and a lifetime. Forces are evaluated at
//! the end of a evaluation interval `dt` past what has already been committed,
//! and only [`Force::commit`] consumes lifetime. Callers must evaluate before
//! committing.
//!
//! An [`AggregateForce`] sums a body's live generators plus an internal
//! force/torque accumulator that contact resolution refills every frame
//! segment.
//!
//! # Example
//!
//! ```
//! use rbd_core::force::{AggregateForce, Force};
//! use rbd_types::InertiaTensor;
//! use nalgebra::{Point3, Vector3};
//!
//! let inertia = InertiaTensor::new([1.0, 1.0, 1.0, 0.0, 0.0, 0.0], Point3::origin(), 1.0);
//! let mut forces = AggregateForce::new();
//! forces.push(Force::constant(Vector3::zeros(), Vector3::new(0.0, -9.8, 0.0), f64::INFINITY));
//! forces.push(Force::linear(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0), Vector3::zeros(), 2.0));
//!
//! let f = forces.force(&inertia, &Point3::origin(), &Vector3::zeros(), 0.5);
//! assert!((f.x - 0.5).abs() < 1e-12);
//! assert!((f.y + 9.8).abs() < 1e-12);
//! ```

use nalgebra::{Point3, Vector3};
use rbd_types::InertiaTensor;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shape of a sinusoidal force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Waveform {
    /// `sin(ωt + φ)`.
    Sine,
    /// `cos(ωt + φ)`.
    Cosine,
}

/// Direction of an inverse-distance force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Polarity {
    /// Pull toward the target point.
    Attract,
    /// Push away from the target point.
    Repel,
}

/// The fixed set of force generators.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ForceKind {
    /// Constant force.
    Constant {
        /// The force vector.
        force: Vector3<f64>,
    },
    /// `rate * t + offset`.
    Linear {
        /// Change of force per second.
        rate: Vector3<f64>,
        /// Force at `t = 0`.
        offset: Vector3<f64>,
    },
    /// `rate * t² + offset`.
    Quadratic {
        /// Quadratic coefficient.
        rate: Vector3<f64>,
        /// Force at `t = 0`.
        offset: Vector3<f64>,
    },
    /// `amplitude * wave(ω t + phase) + offset`.
    Sinusoidal {
        /// Peak force.
        amplitude: Vector3<f64>,
        /// Constant bias.
        offset: Vector3<f64>,
        /// Angular frequency (rad/s).
        angular_frequency: f64,
        /// Phase (rad).
        phase: f64,
        /// Sine or cosine.
        waveform: Waveform,
    },
    /// `(strength / d + offset)` along the unit direction to or from `target`.
    ///
    /// Singular when the body's center of mass sits on `target`.
    InverseDistance {
        /// Point the force is anchored to.
        target: Point3<f64>,
        /// Inverse-distance coefficient.
        strength: f64,
        /// Distance-independent magnitude.
        offset: f64,
        /// Attract or repel.
        polarity: Polarity,
    },
    /// `-coefficient * v`.
    Viscous {
        /// Drag coefficient.
        coefficient: f64,
    },
}

/// A force generator with an application point and a finite or infinite
/// lifetime.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Force {
    kind: ForceKind,
    at: Vector3<f64>,
    lifetime: f64,
    committed: f64,
}

impl Force {
    /// Create a force of any kind.
    #[must_use]
    pub fn new(kind: ForceKind, at: Vector3<f64>, lifetime: f64) -> Self {
        Self {
            kind,
            at,
            lifetime,
            committed: 0.0,
        }
    }

    /// Constant force.
    #[must_use]
    pub fn constant(at: Vector3<f64>, force: Vector3<f64>, lifetime: f64) -> Self {
        Self::new(ForceKind::Constant { force }, at, lifetime)
    }

    /// Force growing linearly with time.
    #[must_use]
    pub fn linear(at: Vector3<f64>, rate: Vector3<f64>, offset: Vector3<f64>, lifetime: f64) -> Self {
        Self::new(ForceKind::Linear { rate, offset }, at, lifetime)
    }

    /// Force growing with the square of time.
    #[must_use]
    pub fn quadratic(
        at: Vector3<f64>,
        rate: Vector3<f64>,
        offset: Vector3<f64>,
        lifetime: f64,
    ) -> Self {
        Self::new(ForceKind::Quadratic { rate, offset }, at, lifetime)
    }

    /// Sine force with `angular_frequency` in rad/s.
    #[must_use]
    pub fn sine(
        at: Vector3<f64>,
        amplitude: Vector3<f64>,
        offset: Vector3<f64>,
        angular_frequency: f64,
        phase: f64,
        lifetime: f64,
    ) -> Self {
        Self::sinusoid(at, amplitude, offset, angular_frequency, phase, Waveform::Sine, lifetime)
    }

    /// Cosine force with `angular_frequency` in rad/s.
    #[must_use]
    pub fn cosine(
        at: Vector3<f64>,
        amplitude: Vector3<f64>,
        offset: Vector3<f64>,
        angular_frequency: f64,
        phase: f64,
        lifetime: f64,
    ) -> Self {
        Self::sinusoid(at, amplitude, offset, angular_frequency, phase, Waveform::Cosine, lifetime)
    }

    fn sinusoid(
        at: Vector3<f64>,
        amplitude: Vector3<f64>,
        offset: Vector3<f64>,
        angular_frequency: f64,
        phase: f64,
        waveform: Waveform,
        lifetime: f64,
    ) -> Self {
        Self::new(
            ForceKind::Sinusoidal {
                amplitude,
                offset,
                angular_frequency,
                phase,
                waveform,
            },
            at,
            lifetime,
        )
    }

    /// Force pulling toward `target`.
    #[must_use]
    pub fn attract(
        at: Vector3<f64>,
        target: Point3<f64>,
        strength: f64,
        offset: f64,
        lifetime: f64,
    ) -> Self {
        Self::new(
            ForceKind::InverseDistance {
                target,
                strength,
                offset,
                polarity: Polarity::Attract,
            },
            at,
            lifetime,
        )
    }

    /// Force pushing away from `target`.
    #[must_use]
    pub fn repel(
        at: Vector3<f64>,
        target: Point3<f64>,
        strength: f64,
        offset: f64,
        lifetime: f64,
    ) -> Self {
        Self::new(
            ForceKind::InverseDistance {
                target,
                strength,
                offset,
                polarity: Polarity::Repel,
            },
            at,
            lifetime,
        )
    }

    /// Velocity-proportional drag.
    #[must_use]
    pub fn viscous(at: Vector3<f64>, coefficient: f64, lifetime: f64) -> Self {
        Self::new(ForceKind::Viscous { coefficient }, at, lifetime)
    }

    /// The generator kind.
    #[must_use]
    pub fn kind(&self) -> &ForceKind {
        &self.kind
    }

    /// Application point relative to the center of mass.
    #[must_use]
    pub fn application_point(&self) -> Vector3<f64> {
        self.at
    }

    /// Total lifetime.
    #[must_use]
    pub fn lifetime(&self) -> f64 {
        self.lifetime
    }

    /// Lifetime left, floored at zero.
    #[must_use]
    pub fn remaining(&self) -> f64 {
        (self.lifetime - self.committed).max(0.0)
    }

    /// Check whether the lifetime is used up.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.committed >= self.lifetime
    }

    /// Consume `dt` of lifetime and report whether the force has expired.
    ///
    /// Committing past the end of the lifetime is fine; the force simply
    /// stays expired. An infinite lifetime never expires.
    ///
    /// # Panics
    ///
    /// Panics if `dt` is negative.
    pub fn commit(&mut self, dt: f64) -> bool {
        assert!(dt >= 0.0, "cannot commit a negative time step: {dt}");
        self.committed += dt;
        self.is_expired()
    }

    /// Evaluate the force at `position` with `velocity`, `dt` past the
    /// committed time.
    #[must_use]
    pub fn force(
        &self,
        _inertia: &InertiaTensor,
        position: &Point3<f64>,
        velocity: &Vector3<f64>,
        dt: f64,
    ) -> Vector3<f64> {
        match &self.kind {
            ForceKind::Constant { force } => *force,
            ForceKind::Linear { rate, offset } => rate * self.elapsed(dt) + offset,
            ForceKind::Quadratic { rate, offset } => {
                let t = self.elapsed(dt);
                rate * (t * t) + offset
            }
            ForceKind::Sinusoidal {
                amplitude,
                offset,
                angular_frequency,
                phase,
                waveform,
            } => {
                let angle = self.elapsed(dt) * angular_frequency + phase;
                let wave = match waveform {
                    Waveform::Sine => angle.sin(),
                    Waveform::Cosine => angle.cos(),
                };
                amplitude * wave + offset
            }
            ForceKind::InverseDistance {
                target,
                strength,
                offset,
                polarity,
            } => {
                let direction = match polarity {
                    Polarity::Attract => target - position,
                    Polarity::Repel => position - target,
                };
                let distance = direction.norm();
                (direction / distance) * (strength / distance + offset)
            }
            ForceKind::Viscous { coefficient } => velocity * -coefficient,
        }
    }

    /// Torque about the center of mass, `at × force`.
    ///
    /// The angular velocity stands in for the linear one, so velocity
    /// dependent generators respond to spin here.
    #[must_use]
    pub fn torque(
        &self,
        inertia: &InertiaTensor,
        position: &Point3<f64>,
        angular_velocity: &Vector3<f64>,
        dt: f64,
    ) -> Vector3<f64> {
        self.at
            .cross(&self.force(inertia, position, angular_velocity, dt))
    }

    /// Time since creation at the end of the evaluation interval.
    fn elapsed(&self, dt: f64) -> f64 {
        dt + self.committed
    }
}

/// Sum of a body's force generators plus an internal accumulator.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AggregateForce {
    generators: Vec<Force>,
    internal_force: Vector3<f64>,
    internal_torque: Vector3<f64>,
}

impl AggregateForce {
    /// Create an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an aggregate over the given generators.
    #[must_use]
    pub fn with_generators(generators: Vec<Force>) -> Self {
        Self {
            generators,
            ..Self::default()
        }
    }

    /// Register another generator.
    pub fn push(&mut self, force: Force) {
        self.generators.push(force);
    }

    /// The live generators.
    #[must_use]
    pub fn generators(&self) -> &[Force] {
        &self.generators
    }

    /// Number of live generators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    /// Check whether there are no live generators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Net force: internal accumulator plus every generator.
    #[must_use]
    pub fn force(
        &self,
        inertia: &InertiaTensor,
        position: &Point3<f64>,
        velocity: &Vector3<f64>,
        dt: f64,
    ) -> Vector3<f64> {
        self.internal_force + self.generator_force(inertia, position, velocity, dt)
    }

    /// Net torque: internal accumulator plus every generator.
    #[must_use]
    pub fn torque(
        &self,
        inertia: &InertiaTensor,
        position: &Point3<f64>,
        angular_velocity: &Vector3<f64>,
        dt: f64,
    ) -> Vector3<f64> {
        self.generators
            .iter()
            .fold(self.internal_torque, |acc, f| {
                acc + f.torque(inertia, position, angular_velocity, dt)
            })
    }

    /// Sum of the generators alone.
    #[must_use]
    pub fn generator_force(
        &self,
        inertia: &InertiaTensor,
        position: &Point3<f64>,
        velocity: &Vector3<f64>,
        dt: f64,
    ) -> Vector3<f64> {
        self.generators
            .iter()
            .fold(Vector3::zeros(), |acc, f| {
                acc + f.force(inertia, position, velocity, dt)
            })
    }

    /// Add to the internal accumulator.
    pub fn add_internal(&mut self, force: Vector3<f64>, torque: Vector3<f64>) {
        self.internal_force += force;
        self.internal_torque += torque;
    }

    /// Accumulated internal force.
    #[must_use]
    pub fn internal_force(&self) -> Vector3<f64> {
        self.internal_force
    }

    /// Accumulated internal torque.
    #[must_use]
    pub fn internal_torque(&self) -> Vector3<f64> {
        self.internal_torque
    }

    /// Reset the internal accumulator.
    pub fn clear_internal_forces(&mut self) {
        self.internal_force = Vector3::zeros();
        self.internal_torque = Vector3::zeros();
    }

    /// Commit `dt` on every generator and drop the expired ones.
    ///
    /// Returns the number of generators removed.
    pub fn commit(&mut self, dt: f64) -> usize {
        let before = self.generators.len();
        self.generators.retain_mut(|f| !f.commit(dt));
        before - self.generators.len()
    }
}
