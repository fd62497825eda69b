//! Configuration types for simulation.
//!
//! This module provides the [`WorldConfig`] that controls how a world
//! advances: gravity, the per-segment displacement bound, integration
//! method, default contact materials and contact tolerances.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance for time and determinant comparisons.
pub const EPSILON: f64 = 1e-6;

/// Distance under which two surfaces count as touching.
pub const WELD_DISTANCE: f64 = 1e-3;

/// Magnitude of standard gravity (m/s²).
pub const STANDARD_GRAVITY: f64 = 9.8;

/// Main configuration for a simulation world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Gravitational acceleration applied to every moving body.
    pub gravity: Vector3<f64>,
    /// Largest distance any moving body may cover in one frame segment.
    pub max_displacement: f64,
    /// Integration method used when committing body movement.
    pub integration: IntegrationMethod,
    /// Restitution of the default collider.
    pub default_restitution: f64,
    /// Coulomb friction coefficient of the default collider.
    pub default_friction: f64,
    /// Distance under which surfaces count as touching.
    pub weld_distance: f64,
    /// Normal speed below which a touching pair is sliding rather than colliding.
    pub resting_speed: f64,
    /// Upper bound on collision refinements within one frame segment.
    pub max_refinement_iterations: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -STANDARD_GRAVITY, 0.0),
            max_displacement: 1.0,
            integration: IntegrationMethod::RungeKutta4,
            default_restitution: 0.5,
            default_friction: 0.0,
            weld_distance: WELD_DISTANCE,
            resting_speed: 0.2,
            max_refinement_iterations: 64,
        }
    }
}

impl WorldConfig {
    /// Create a configuration without gravity.
    #[must_use]
    pub fn zero_gravity() -> Self {
        Self {
            gravity: Vector3::zeros(),
            ..Default::default()
        }
    }

    /// Create a configuration with short frame segments.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            max_displacement: 0.1,
            integration: IntegrationMethod::RungeKutta4,
            max_refinement_iterations: 256,
            ..Default::default()
        }
    }

    /// Create a cheap configuration for coarse simulation.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_displacement: 5.0,
            integration: IntegrationMethod::Euler,
            ..Default::default()
        }
    }

    /// Set the gravity.
    #[must_use]
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set the maximum displacement per frame segment.
    #[must_use]
    pub fn with_max_displacement(mut self, max_displacement: f64) -> Self {
        self.max_displacement = max_displacement;
        self
    }

    /// Set the integration method.
    #[must_use]
    pub fn with_integration(mut self, method: IntegrationMethod) -> Self {
        self.integration = method;
        self
    }

    /// Set default material properties.
    #[must_use]
    pub fn materials(mut self, restitution: f64, friction: f64) -> Self {
        self.default_restitution = restitution.clamp(0.0, 1.0);
        self.default_friction = friction.max(0.0);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.max_displacement.is_finite() || self.max_displacement <= 0.0 {
            return Err(crate::SimError::invalid_config(
                "max_displacement must be positive and finite",
            ));
        }

        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }

        if !(0.0..=1.0).contains(&self.default_restitution) {
            return Err(crate::SimError::invalid_config(
                "restitution must be between 0 and 1",
            ));
        }

        if self.default_friction < 0.0 || self.default_friction.is_nan() {
            return Err(crate::SimError::invalid_config(
                "friction cannot be negative",
            ));
        }

        if self.weld_distance <= 0.0 || self.weld_distance.is_nan() {
            return Err(crate::SimError::invalid_config(
                "weld_distance must be positive",
            ));
        }

        if self.resting_speed < 0.0 || self.resting_speed.is_nan() {
            return Err(crate::SimError::invalid_config(
                "resting_speed cannot be negative",
            ));
        }

        if self.max_refinement_iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "max_refinement_iterations must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Integration method for body movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegrationMethod {
    /// Euler velocity update with trapezoidal displacement.
    Euler,
    /// Classic four-stage Runge-Kutta.
    #[default]
    RungeKutta4,
}

impl IntegrationMethod {
    /// Get the order of accuracy for this method.
    #[must_use]
    pub const fn order(self) -> usize {
        match self {
            Self::Euler => 1,
            Self::RungeKutta4 => 4,
        }
    }

    /// Number of force evaluations per step.
    #[must_use]
    pub const fn evaluations(self) -> usize {
        match self {
            Self::Euler => 1,
            Self::RungeKutta4 => 4,
        }
    }
}

impl std::fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Euler => write!(f, "Euler"),
            Self::RungeKutta4 => write!(f, "RK4"),
        }
    }
}
