//! Simulation stepping and control flow.
//!
//! [`World::advance_time`] may return early when a contact turns into a
//! resting one. The [`Stepper`] hides that: it re-invokes the world until the
//! requested time is consumed, applies forces queued between frames and
//! reports how the time was spent.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use rbd_core::{shapes, RigidBody, Stepper, World};
//!
//! let mut world = World::default();
//! let ground = shapes::cuboid(Vector3::new(10.0, 0.5, 10.0)).translated(Vector3::new(0.0, -0.5, 0.0));
//! world.add_body(RigidBody::immovable(ground).unwrap());
//! let cube = world.add_moving_body(
//!     RigidBody::from_mesh(shapes::cube(1.0, Point3::new(0.0, 3.0, 0.0)), 1.0).unwrap(),
//! );
//!
//! let mut stepper = Stepper::new();
//! let report = stepper.run_for(&mut world, 2.0).unwrap();
//!
//! assert!((report.elapsed - 2.0).abs() < 1e-9);
//! assert!(report.collisions > 0);
//! assert!(world.body(cube).unwrap().center_of_mass().y > 0.0);
//! ```

use rbd_types::{BodyId, Result, SimError, WorldConfig, EPSILON};
use tracing::{debug, warn};

use crate::body::RigidBody;
use crate::force::Force;
use crate::world::{time_remaining, World};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a stretch of simulated time was spent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    /// Simulated time actually advanced.
    pub elapsed: f64,
    /// Calls made to [`World::advance_time`].
    pub calls: usize,
    /// Impacts resolved along the way.
    pub collisions: u64,
}

impl StepReport {
    fn merge(&mut self, other: &Self) {
        self.elapsed += other.elapsed;
        self.calls += other.calls;
        self.collisions += other.collisions;
    }
}

/// Configuration for the stepper.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperConfig {
    /// Simulated time per [`Stepper::step`].
    pub frame_time: f64,
    /// Consecutive calls without progress tolerated before giving up.
    pub max_stalled_calls: usize,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            frame_time: 1.0 / 60.0,
            max_stalled_calls: 8,
        }
    }
}

impl StepperConfig {
    /// Set the frame time.
    #[must_use]
    pub fn with_frame_time(mut self, frame_time: f64) -> Self {
        self.frame_time = frame_time;
        self
    }

    /// Set how many calls in a row may fail to advance time.
    #[must_use]
    pub fn with_max_stalled_calls(mut self, max_stalled_calls: usize) -> Self {
        self.max_stalled_calls = max_stalled_calls;
        self
    }
}

/// Drives a [`World`] through whole frames.
#[derive(Debug, Clone, Default)]
pub struct Stepper {
    /// Stepper configuration.
    config: StepperConfig,
    /// Forces to register at the start of the next step.
    pending_forces: Vec<(BodyId, Force)>,
}

impl Stepper {
    /// Create a new stepper with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stepper with custom configuration.
    #[must_use]
    pub fn with_config(config: StepperConfig) -> Self {
        Self {
            config,
            pending_forces: Vec::new(),
        }
    }

    /// Get the stepper configuration.
    #[must_use]
    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    /// Queue a force for `body`, applied on the next [`Stepper::step`].
    pub fn submit_force(&mut self, body: BodyId, force: Force) {
        self.pending_forces.push((body, force));
    }

    /// Number of queued forces.
    #[must_use]
    pub fn pending_forces(&self) -> usize {
        self.pending_forces.len()
    }

    /// Drop all queued forces.
    pub fn clear_forces(&mut self) {
        self.pending_forces.clear();
    }

    /// Simulate one frame of [`StepperConfig::frame_time`].
    ///
    /// # Errors
    ///
    /// Returns an error if a queued force targets a missing or static body,
    /// or if [`Stepper::run_for`] fails.
    pub fn step(&mut self, world: &mut World) -> Result<StepReport> {
        for (body, force) in self.pending_forces.drain(..) {
            world.apply_force(body, force)?;
        }

        self.run_for(world, self.config.frame_time)
    }

    /// Simulate `frames` frames.
    ///
    /// # Errors
    ///
    /// Returns the first error of any frame.
    pub fn run(&mut self, world: &mut World, frames: u64) -> Result<StepReport> {
        let mut report = StepReport::default();
        for _ in 0..frames {
            report.merge(&self.step(world)?);
        }
        Ok(report)
    }

    /// Simulate exactly `duration`, re-invoking the world after every early
    /// return.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidTimestep`] for a negative or non-finite
    /// duration, any error of [`World::advance_time`], and
    /// [`SimError::Diverged`] once more than
    /// [`StepperConfig::max_stalled_calls`] calls in a row advance nothing.
    pub fn run_for(&self, world: &mut World, duration: f64) -> Result<StepReport> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(SimError::InvalidTimestep(duration));
        }

        let collisions_before = world.collisions_resolved();
        let mut report = StepReport::default();
        let mut stalled = 0_usize;

        while let Some(remaining) = time_remaining(duration, report.elapsed) {
            let advanced = world.advance_time(remaining)?;
            report.calls += 1;
            report.elapsed += advanced;

            if advanced <= EPSILON {
                stalled += 1;
                if stalled > self.config.max_stalled_calls {
                    warn!(stalled, elapsed = report.elapsed, "world stopped advancing");
                    return Err(SimError::diverged(format!(
                        "no progress after {stalled} consecutive calls"
                    )));
                }
            } else {
                stalled = 0;
            }
        }

        report.collisions = world.collisions_resolved() - collisions_before;
        debug!(
            elapsed = report.elapsed,
            calls = report.calls,
            collisions = report.collisions,
            "run finished"
        );
        Ok(report)
    }
}

/// Assembles a scene: world settings, stepper settings and the bodies in it.
///
/// Static bodies are added first, in call order, followed by moving bodies,
/// so the returned ids are stable for a given builder.
#[derive(Debug, Default)]
pub struct SimulationBuilder {
    world: WorldConfig,
    stepper: StepperConfig,
    fixed: Vec<RigidBody>,
    moving: Vec<RigidBody>,
}

impl SimulationBuilder {
    /// Create a new simulation builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the world configuration.
    #[must_use]
    pub fn world_config(mut self, config: WorldConfig) -> Self {
        self.world = config;
        self
    }

    /// Default restitution and friction for every pair.
    #[must_use]
    pub fn materials(mut self, restitution: f64, friction: f64) -> Self {
        self.world = self.world.materials(restitution, friction);
        self
    }

    /// Replace the stepper configuration.
    #[must_use]
    pub fn stepper_config(mut self, config: StepperConfig) -> Self {
        self.stepper = config;
        self
    }

    /// Simulated time per [`Stepper::step`].
    #[must_use]
    pub fn frame_time(mut self, frame_time: f64) -> Self {
        self.stepper.frame_time = frame_time;
        self
    }

    /// Calls in a row that may fail to advance before the stepper gives up.
    #[must_use]
    pub fn max_stalled_calls(mut self, max_stalled_calls: usize) -> Self {
        self.stepper.max_stalled_calls = max_stalled_calls;
        self
    }

    /// Add a body that never moves.
    #[must_use]
    pub fn fixed_body(mut self, body: RigidBody) -> Self {
        self.fixed.push(body);
        self
    }

    /// Add a body driven by gravity and registered forces.
    #[must_use]
    pub fn moving_body(mut self, body: RigidBody) -> Self {
        self.moving.push(body);
        self
    }

    /// Build the world and its stepper, returning the ids of the added
    /// bodies in insertion order (static first).
    ///
    /// # Errors
    ///
    /// Returns an error if the world configuration is invalid, or if the frame
    /// time is not finite and positive.
    pub fn build(self) -> Result<(World, Stepper, Vec<BodyId>)> {
        if !self.stepper.frame_time.is_finite() || self.stepper.frame_time <= 0.0 {
            return Err(SimError::InvalidTimestep(self.stepper.frame_time));
        }

        let mut world = World::new(self.world)?;
        let mut ids = Vec::with_capacity(self.fixed.len() + self.moving.len());
        ids.extend(self.fixed.into_iter().map(|body| world.add_body(body)));
        ids.extend(self.moving.into_iter().map(|body| world.add_moving_body(body)));

        debug!(
            bodies = ids.len(),
            frame_time = self.stepper.frame_time,
            "simulation assembled"
        );
        Ok((world, Stepper::with_config(self.stepper), ids))
    }
}
