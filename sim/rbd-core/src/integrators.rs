//! Numerical integration of linear and angular motion.
//!
//! Integrators are pure: they read the aggregate force, the inertia tensor
//! and the start-of-step state, and return a *delta* plus the end-of-step
//! velocity. The caller composes the delta with the prior state. This keeps
//! them reusable for speculative trial steps during time-of-impact search.
//!
//! # Integration Methods
//!
//! - **Euler**: one force sample at `t = 0`; velocity is first order but
//!   displacement averages the start and end velocities
//! - **RK4**: four samples at `0, dt/2, dt/2, dt`, with the oriented inertia
//!   tensor re-evaluated at every provisional orientation
//!
//! # Example
//!
//! ```
//! use rbd_core::force::AggregateForce;
//! use rbd_core::integrators::{Integrator, RungeKutta4};
//! use rbd_types::InertiaTensor;
//! use nalgebra::{Point3, Vector3};
//!
//! let inertia = InertiaTensor::new([1.0, 1.0, 1.0, 0.0, 0.0, 0.0], Point3::origin(), 2.0);
//! let forces = AggregateForce::new();
//! let v0 = Vector3::new(1.0, 0.0, 0.0);
//!
//! let (dx, v1) = RungeKutta4::project_translation(&forces, &inertia, &v0, 0.5);
//! assert!((dx.x - 0.5).abs() < 1e-12);
//! assert_eq!(v1, v0);
//! ```

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use rbd_types::{InertiaTensor, IntegrationMethod};

use crate::force::AggregateForce;

/// Trait for integration methods.
pub trait Integrator {
    /// Project translation over `dt`.
    ///
    /// Returns `(Δposition, v1)`.
    ///
    /// # Panics
    ///
    /// Panics if `dt` is negative.
    fn project_translation(
        forces: &AggregateForce,
        inertia: &InertiaTensor,
        v0: &Vector3<f64>,
        dt: f64,
    ) -> (Vector3<f64>, Vector3<f64>);

    /// Project rotation over `dt`.
    ///
    /// Returns `(Δorientation, w1)`. The delta is a raw quaternion to be
    /// added to `o0` and renormalized by the caller.
    ///
    /// # Panics
    ///
    /// Panics if `dt` is negative.
    fn project_rotation(
        forces: &AggregateForce,
        inertia: &InertiaTensor,
        o0: &UnitQuaternion<f64>,
        w0: &Vector3<f64>,
        dt: f64,
    ) -> (Quaternion<f64>, Vector3<f64>);
}

/// Dispatch translation to the integrator selected by `method`.
#[must_use]
pub fn project_translation_with(
    method: IntegrationMethod,
    forces: &AggregateForce,
    inertia: &InertiaTensor,
    v0: &Vector3<f64>,
    dt: f64,
) -> (Vector3<f64>, Vector3<f64>) {
    match method {
        IntegrationMethod::Euler => Euler::project_translation(forces, inertia, v0, dt),
        IntegrationMethod::RungeKutta4 => RungeKutta4::project_translation(forces, inertia, v0, dt),
    }
}

/// Dispatch rotation to the integrator selected by `method`.
#[must_use]
pub fn project_rotation_with(
    method: IntegrationMethod,
    forces: &AggregateForce,
    inertia: &InertiaTensor,
    o0: &UnitQuaternion<f64>,
    w0: &Vector3<f64>,
    dt: f64,
) -> (Quaternion<f64>, Vector3<f64>) {
    match method {
        IntegrationMethod::Euler => Euler::project_rotation(forces, inertia, o0, w0, dt),
        IntegrationMethod::RungeKutta4 => {
            RungeKutta4::project_rotation(forces, inertia, o0, w0, dt)
        }
    }
}

/// Euler integration.
///
/// ```text
/// v(t+dt) = v(t) + a(t) * dt
/// Δx      = (v(t) + v(t+dt)) * dt / 2
/// ```
pub struct Euler;

impl Integrator for Euler {
    fn project_translation(
        forces: &AggregateForce,
        inertia: &InertiaTensor,
        v0: &Vector3<f64>,
        dt: f64,
    ) -> (Vector3<f64>, Vector3<f64>) {
        assert!(dt >= 0.0, "negative time step: {dt}");

        let com = inertia.center_of_mass();
        let accel = forces.force(inertia, &com, v0, 0.0) * inertia.inverse_mass();
        let v1 = v0 + accel * dt;

        ((v0 + v1) * (dt * 0.5), v1)
    }

    fn project_rotation(
        forces: &AggregateForce,
        inertia: &InertiaTensor,
        o0: &UnitQuaternion<f64>,
        w0: &Vector3<f64>,
        dt: f64,
    ) -> (Quaternion<f64>, Vector3<f64>) {
        assert!(dt >= 0.0, "negative time step: {dt}");

        let com = inertia.center_of_mass();
        let view = inertia.view(o0);
        let accel = forces.torque(inertia, &com, w0, 0.0) / &view;
        let w1 = w0 + accel * dt;
        let w_avg = (w0 + w1) * 0.5;

        (spin(&w_avg, o0.quaternion()) * dt, w1)
    }
}

/// Fourth-order Runge-Kutta integration.
///
/// High accuracy for position and velocity dependent forces at the cost of
/// four force evaluations per step.
pub struct RungeKutta4;

impl Integrator for RungeKutta4 {
    fn project_translation(
        forces: &AggregateForce,
        inertia: &InertiaTensor,
        v0: &Vector3<f64>,
        dt: f64,
    ) -> (Vector3<f64>, Vector3<f64>) {
        assert!(dt >= 0.0, "negative time step: {dt}");

        let half_dt = dt * 0.5;
        let sixth_dt = dt / 6.0;
        let inv_mass = inertia.inverse_mass();
        let com = inertia.center_of_mass();

        let f1 = forces.force(inertia, &com, v0, 0.0);
        let v_1 = v0 + f1 * (half_dt * inv_mass);

        let x2 = com + v0 * half_dt;
        let f2 = forces.force(inertia, &x2, &v_1, half_dt);
        let v_2 = v0 + f2 * (half_dt * inv_mass);

        let x3 = com + v_1 * half_dt;
        let f3 = forces.force(inertia, &x3, &v_2, half_dt);
        let v_3 = v0 + f3 * (dt * inv_mass);

        let x4 = com + v_2 * dt;
        let f4 = forces.force(inertia, &x4, &v_3, dt);

        let v1 = v0 + (f1 + (f2 + f3) * 2.0 + f4) * (sixth_dt * inv_mass);
        let dx = (v0 + (v_1 + v_2) * 2.0 + v_3) * sixth_dt;

        (dx, v1)
    }

    fn project_rotation(
        forces: &AggregateForce,
        inertia: &InertiaTensor,
        o0: &UnitQuaternion<f64>,
        w0: &Vector3<f64>,
        dt: f64,
    ) -> (Quaternion<f64>, Vector3<f64>) {
        assert!(dt >= 0.0, "negative time step: {dt}");

        let half_dt = dt * 0.5;
        let sixth_dt = dt / 6.0;
        let com = inertia.center_of_mass();
        let q0 = o0.quaternion();

        let q1 = spin(w0, q0);
        let t1 = forces.torque(inertia, &com, w0, 0.0);
        let o_1 = q0 + q1 * half_dt;
        let w_1 = w0 + (t1 * half_dt) / &inertia.view(&normalized(&o_1));

        let q2 = spin(&w_1, &o_1);
        let t2 = forces.torque(inertia, &com, &w_1, half_dt);
        let o_2 = q0 + q2 * half_dt;
        let w_2 = w0 + (t2 * half_dt) / &inertia.view(&normalized(&o_2));

        let q3 = spin(&w_2, &o_2);
        let t3 = forces.torque(inertia, &com, &w_2, half_dt);
        let o_3 = q0 + q3 * dt;
        let w_3 = w0 + (t3 * dt) / &inertia.view(&normalized(&o_3));

        let q4 = spin(&w_3, &o_3);
        let t4 = forces.torque(inertia, &com, &w_3, dt);

        let delta = (q1 + (q2 + q3) * 2.0 + q4) * sixth_dt;
        let view = inertia.view(&normalized(&(q0 + delta)));
        let w1 = w0 + ((t1 + (t2 + t3) * 2.0 + t4) * sixth_dt) / &view;

        (delta, w1)
    }
}

/// Quaternion derivative `0.5 * (0, ω) * q`.
fn spin(omega: &Vector3<f64>, q: &Quaternion<f64>) -> Quaternion<f64> {
    Quaternion::from_imag(*omega) * q * 0.5
}

fn normalized(q: &Quaternion<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize(*q)
}

/// Compose an orientation with an integrator delta.
#[must_use]
pub fn compose_orientation(
    orientation: &UnitQuaternion<f64>,
    delta: &Quaternion<f64>,
) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize(orientation.quaternion() + delta)
}
