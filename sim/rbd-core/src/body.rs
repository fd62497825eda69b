//! Rigid bodies: mass properties, motion state, forces and geometry.
//!
//! A [`RigidBody`] keeps its mesh in the body frame, relative to the center
//! of mass. World-space positions are derived from the center of mass and
//! orientation held in the body's state.
//!
//! Bodies carry their own clock. Within a frame segment each body starts at
//! time `0` ([`RigidBody::begin_time_step`]) and is moved forward with
//! [`RigidBody::commit_movement`]; the world may commit different bodies to
//! different times while it searches for the first impact.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rbd_types::{InertiaTensor, InertiaTensorView, IntegrationMethod, Result, SimError};
use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::force::{AggregateForce, Force};
use crate::integrators::{compose_orientation, project_rotation_with, project_translation_with};
use crate::shapes::TriangleMesh;

/// A rigid body in the simulation world.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBody {
    name: Option<String>,
    inertia: InertiaTensor,
    orientation: UnitQuaternion<f64>,
    velocity: Vector3<f64>,
    angular_velocity: Vector3<f64>,
    forces: AggregateForce,
    current_time: f64,
    /// Vertices in the body frame, relative to the center of mass.
    local_vertices: Vec<Vector3<f64>>,
    triangles: Vec<[usize; 3]>,
    integration: IntegrationMethod,
}

/// Speculative pose of a body at some time within the current segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Center of mass.
    pub center_of_mass: Point3<f64>,
    /// Orientation.
    pub orientation: UnitQuaternion<f64>,
    /// Linear velocity.
    pub velocity: Vector3<f64>,
    /// Angular velocity.
    pub angular_velocity: Vector3<f64>,
}

impl Projection {
    /// Velocity of the material point currently at `point`.
    #[must_use]
    pub fn velocity_at(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.velocity + self.angular_velocity.cross(&(point - self.center_of_mass))
    }
}

impl RigidBody {
    /// Create a body from world-space vertices and precomputed mass properties.
    ///
    /// The vertices are taken at identity orientation.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidMesh`] when a triangle references a
    /// vertex that does not exist, and [`SimError::InvalidMassProperties`]
    /// for a NaN mass or a finite mass that is not positive.
    pub fn new(
        vertices: Vec<Point3<f64>>,
        triangles: Vec<[usize; 3]>,
        inertia: InertiaTensor,
    ) -> Result<Self> {
        check_triangles(vertices.len(), &triangles)?;

        let mass = inertia.mass();
        if mass.is_nan() || (mass.is_finite() && mass <= 0.0) {
            return Err(SimError::invalid_mass(format!(
                "mass must be positive or infinite, got {mass}"
            )));
        }

        let com = inertia.center_of_mass();
        let local_vertices = vertices.iter().map(|p| p - com).collect();

        Ok(Self {
            name: None,
            inertia,
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            forces: AggregateForce::new(),
            current_time: 0.0,
            local_vertices,
            triangles,
            integration: IntegrationMethod::default(),
        })
    }

    /// Create a body of uniform `density` from a closed triangle mesh.
    ///
    /// A density of `+∞` makes the body immovable.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidMesh`] for out-of-range triangle indices
    /// and [`SimError::InvalidMassProperties`] when the mesh encloses no
    /// volume or `density` is not positive.
    pub fn from_mesh(mesh: TriangleMesh, density: f64) -> Result<Self> {
        if density.is_nan() || density <= 0.0 {
            return Err(SimError::invalid_mass(format!(
                "density must be positive, got {density}"
            )));
        }
        check_triangles(mesh.vertices.len(), &mesh.triangles)?;

        let inertia = InertiaTensor::from_polyhedron(&mesh.vertices, &mesh.triangles, density);
        Self::new(mesh.vertices, mesh.triangles, inertia)
    }

    /// Create an immovable body from a closed triangle mesh.
    ///
    /// # Errors
    ///
    /// Never fails for a well-formed mesh; kept fallible for symmetry with
    /// [`RigidBody::from_mesh`].
    pub fn immovable(mesh: TriangleMesh) -> Result<Self> {
        Self::from_mesh(mesh, f64::INFINITY)
    }

    /// Set the body name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the linear velocity.
    #[must_use]
    pub fn with_velocity(mut self, velocity: Vector3<f64>) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set the angular velocity.
    #[must_use]
    pub fn with_angular_velocity(mut self, angular_velocity: Vector3<f64>) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    /// Set the orientation, rotating the body about its center of mass.
    #[must_use]
    pub fn with_orientation(mut self, orientation: UnitQuaternion<f64>) -> Self {
        self.orientation = orientation;
        self
    }

    /// Register force generators.
    #[must_use]
    pub fn with_forces(mut self, forces: impl IntoIterator<Item = Force>) -> Self {
        for force in forces {
            self.apply_force(force);
        }
        self
    }

    /// Set the integration method.
    #[must_use]
    pub fn with_integration(mut self, method: IntegrationMethod) -> Self {
        self.integration = method;
        self
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Body name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Mass properties.
    #[must_use]
    pub fn inertia(&self) -> &InertiaTensor {
        &self.inertia
    }

    /// Inertia tensor under the current orientation.
    #[must_use]
    pub fn inertia_view(&self) -> InertiaTensorView {
        self.inertia.view(&self.orientation)
    }

    /// Mass (`+∞` for immovable bodies).
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.inertia.mass()
    }

    /// Check whether the body has infinite mass.
    #[must_use]
    pub fn is_immovable(&self) -> bool {
        self.inertia.is_infinite()
    }

    /// Center of mass in world space.
    #[must_use]
    pub fn center_of_mass(&self) -> Point3<f64> {
        self.inertia.center_of_mass()
    }

    /// Move the body so its center of mass sits at `position`.
    pub fn set_center_of_mass(&mut self, position: Point3<f64>) {
        let delta = position - self.inertia.center_of_mass();
        self.inertia.move_center_of_mass(&delta);
    }

    /// Orientation.
    #[must_use]
    pub fn orientation(&self) -> &UnitQuaternion<f64> {
        &self.orientation
    }

    /// Set the orientation.
    pub fn set_orientation(&mut self, orientation: UnitQuaternion<f64>) {
        self.orientation = orientation;
    }

    /// Linear velocity.
    #[must_use]
    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    /// Set the linear velocity.
    pub fn set_velocity(&mut self, velocity: Vector3<f64>) {
        self.velocity = velocity;
    }

    /// Angular velocity.
    #[must_use]
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.angular_velocity
    }

    /// Set the angular velocity.
    pub fn set_angular_velocity(&mut self, angular_velocity: Vector3<f64>) {
        self.angular_velocity = angular_velocity;
    }

    /// Speed of the center of mass.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Velocity of the material point currently at `point`.
    #[must_use]
    pub fn velocity_at(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.velocity + self.angular_velocity.cross(&(point - self.center_of_mass()))
    }

    /// Linear momentum. Zero for immovable bodies.
    #[must_use]
    pub fn momentum(&self) -> Vector3<f64> {
        if self.is_immovable() {
            Vector3::zeros()
        } else {
            self.velocity * self.mass()
        }
    }

    /// Angular momentum about the center of mass. Zero for immovable bodies.
    #[must_use]
    pub fn angular_momentum(&self) -> Vector3<f64> {
        if self.is_immovable() {
            Vector3::zeros()
        } else {
            &self.inertia_view() * self.angular_velocity
        }
    }

    /// Translational plus rotational kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        if self.is_immovable() {
            return 0.0;
        }

        0.5 * self.mass() * self.velocity.norm_squared()
            + 0.5 * self.angular_velocity.dot(&self.angular_momentum())
    }

    /// Largest distance from the center of mass to a vertex.
    #[must_use]
    pub fn bounding_radius(&self) -> f64 {
        self.local_vertices
            .iter()
            .map(|v| v.norm())
            .fold(0.0, f64::max)
    }

    /// Time committed within the current segment.
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Integration method.
    #[must_use]
    pub fn integration(&self) -> IntegrationMethod {
        self.integration
    }

    /// Set the integration method.
    pub fn set_integration(&mut self, method: IntegrationMethod) {
        self.integration = method;
    }

    /// Forces acting on the body.
    #[must_use]
    pub fn forces(&self) -> &AggregateForce {
        &self.forces
    }

    /// Mutable access to the forces.
    pub fn forces_mut(&mut self) -> &mut AggregateForce {
        &mut self.forces
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Vertices in world space.
    #[must_use]
    pub fn vertices(&self) -> Vec<Point3<f64>> {
        self.vertices_at(&self.center_of_mass(), &self.orientation)
    }

    /// Vertices of the body placed at the given pose.
    #[must_use]
    pub fn vertices_at(
        &self,
        center_of_mass: &Point3<f64>,
        orientation: &UnitQuaternion<f64>,
    ) -> Vec<Point3<f64>> {
        self.local_vertices
            .iter()
            .map(|v| center_of_mass + orientation * v)
            .collect()
    }

    /// Triangles as vertex indices into [`RigidBody::vertices`].
    #[must_use]
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// World-space triangles, for export.
    #[must_use]
    pub fn world_triangles(&self) -> Vec<[Point3<f64>; 3]> {
        let vertices = self.vertices();
        self.triangles
            .iter()
            .map(|&[i, j, k]| [vertices[i], vertices[j], vertices[k]])
            .collect()
    }

    // =========================================================================
    // Forces and impulses
    // =========================================================================

    /// Register a force generator. Ignored by immovable bodies.
    pub fn apply_force(&mut self, force: Force) {
        if self.is_immovable() {
            trace!("ignoring force on an immovable body");
            return;
        }
        self.forces.push(force);
    }

    /// Apply `impulse` at the world-space `point`.
    pub fn apply_impulse(&mut self, impulse: &Vector3<f64>, point: &Point3<f64>) {
        if self.is_immovable() {
            return;
        }

        let lever = point - self.center_of_mass();
        self.velocity += impulse * self.inertia.inverse_mass();
        self.angular_velocity += lever.cross(impulse) / &self.inertia_view();
    }

    /// Apply an impulse of magnitude `magnitude` along `direction`.
    ///
    /// `angular_multiplier` is `(r × direction) / I` for the contact lever
    /// `r`, precomputed by the caller.
    pub fn apply_directed_impulse(
        &mut self,
        direction: &Vector3<f64>,
        angular_multiplier: &Vector3<f64>,
        magnitude: f64,
    ) {
        if self.is_immovable() {
            return;
        }

        self.velocity += direction * (magnitude * self.inertia.inverse_mass());
        self.angular_velocity += angular_multiplier * magnitude;
    }

    // =========================================================================
    // Time stepping
    // =========================================================================

    /// Start a new frame segment: rewind the clock and clear internal forces.
    pub fn begin_time_step(&mut self) {
        self.current_time = 0.0;
        self.forces.clear_internal_forces();
    }

    /// Integrate up to `t` and commit the result.
    ///
    /// Calls with `t` earlier than the committed time are ignored.
    pub fn commit_movement(&mut self, t: f64) {
        if t <= self.current_time {
            return;
        }

        let dt = t - self.current_time;
        let (dx, v1) = project_translation_with(
            self.integration,
            &self.forces,
            &self.inertia,
            &self.velocity,
            dt,
        );
        let (dq, w1) = project_rotation_with(
            self.integration,
            &self.forces,
            &self.inertia,
            &self.orientation,
            &self.angular_velocity,
            dt,
        );

        self.inertia.move_center_of_mass(&dx);
        self.orientation = compose_orientation(&self.orientation, &dq);
        self.velocity = v1;
        self.angular_velocity = w1;
        self.current_time = t;

        let expired = self.forces.commit(dt);
        if expired > 0 {
            trace!(expired, "dropped expired force generators");
        }
    }

    /// Pose and velocities at time `t` without committing anything.
    ///
    /// Times at or before the committed time return the current state.
    #[must_use]
    pub fn project(&self, t: f64) -> Projection {
        let current = Projection {
            center_of_mass: self.center_of_mass(),
            orientation: self.orientation,
            velocity: self.velocity,
            angular_velocity: self.angular_velocity,
        };

        if t <= self.current_time {
            return current;
        }

        let dt = t - self.current_time;
        let (dx, v1) = project_translation_with(
            self.integration,
            &self.forces,
            &self.inertia,
            &self.velocity,
            dt,
        );
        let (dq, w1) = project_rotation_with(
            self.integration,
            &self.forces,
            &self.inertia,
            &self.orientation,
            &self.angular_velocity,
            dt,
        );

        Projection {
            center_of_mass: current.center_of_mass + dx,
            orientation: compose_orientation(&self.orientation, &dq),
            velocity: v1,
            angular_velocity: w1,
        }
    }
}

/// Reject triangles that index past the vertex list.
fn check_triangles(vertex_count: usize, triangles: &[[usize; 3]]) -> Result<()> {
    for (index, triangle) in triangles.iter().enumerate() {
        if let Some(&vertex) = triangle.iter().find(|&&v| v >= vertex_count) {
            return Err(SimError::invalid_mesh(format!(
                "triangle {index} references vertex {vertex}, mesh has {vertex_count}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::shapes::{cube, cuboid};
    use approx::assert_relative_eq;

    fn unit_cube_at(center: Point3<f64>) -> RigidBody {
        RigidBody::from_mesh(cube(1.0, center), 1.0).unwrap()
    }

    #[test]
    fn test_from_mesh_mass_properties() {
        let body = unit_cube_at(Point3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(body.mass(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            body.center_of_mass(),
            Point3::new(1.0, 2.0, 3.0),
            epsilon = 1e-12
        );
        assert!(!body.is_immovable());
        assert_eq!(body.triangles().len(), 12);
    }

    #[test]
    fn test_invalid_mass_rejected() {
        let zero = InertiaTensor::new([1.0; 6], Point3::origin(), 0.0);
        let err = RigidBody::new(Vec::new(), Vec::new(), zero).unwrap_err();
        assert!(matches!(err, SimError::InvalidMassProperties { .. }));

        let nan = InertiaTensor::new([1.0; 6], Point3::origin(), f64::NAN);
        assert!(RigidBody::new(Vec::new(), Vec::new(), nan).is_err());

        assert!(RigidBody::from_mesh(cuboid(Vector3::repeat(1.0)), -1.0).is_err());
    }

    #[test]
    fn test_out_of_range_triangle_rejected() {
        let mut mesh = cube(1.0, Point3::origin());
        mesh.triangles.push([0, 1, 99]);

        let err = RigidBody::from_mesh(mesh.clone(), 1.0).unwrap_err();
        assert!(matches!(err, SimError::InvalidMesh { .. }));
        assert!(err.to_string().contains("99"));

        let err = RigidBody::immovable(mesh.clone()).unwrap_err();
        assert!(matches!(err, SimError::InvalidMesh { .. }));

        let inertia = InertiaTensor::immovable(Point3::origin());
        let err = RigidBody::new(mesh.vertices, mesh.triangles, inertia).unwrap_err();
        assert!(matches!(err, SimError::InvalidMesh { .. }));
    }

    #[test]
    fn test_immovable_body() {
        let mut ground = RigidBody::immovable(cuboid(Vector3::new(5.0, 0.5, 5.0))).unwrap();
        assert!(ground.is_immovable());
        assert_relative_eq!(ground.momentum().norm(), 0.0);
        assert_relative_eq!(ground.kinetic_energy(), 0.0);

        ground.apply_force(Force::constant(
            Vector3::zeros(),
            Vector3::new(0.0, -10.0, 0.0),
            f64::INFINITY,
        ));
        assert!(ground.forces().is_empty());

        ground.apply_impulse(&Vector3::new(1.0, 0.0, 0.0), &Point3::new(1.0, 0.5, 0.0));
        assert_relative_eq!(ground.velocity().norm(), 0.0);
        assert_relative_eq!(ground.angular_velocity().norm(), 0.0);
    }

    #[test]
    fn test_vertices_follow_pose() {
        let mut body = unit_cube_at(Point3::origin());
        body.set_center_of_mass(Point3::new(0.0, 10.0, 0.0));
        body.set_orientation(UnitQuaternion::from_axis_angle(
            &Vector3::z_axis(),
            std::f64::consts::FRAC_PI_2,
        ));

        let vertices = body.vertices();
        // Vertex 1 is (+x, -y, -z) in the body frame.
        assert_relative_eq!(vertices[1], Point3::new(0.5, 10.5, -0.5), epsilon = 1e-12);
        assert_eq!(body.world_triangles().len(), 12);
    }

    #[test]
    fn test_apply_impulse_off_center() {
        let mut body = unit_cube_at(Point3::origin());
        let i = body.inertia().tensor()[0];

        body.apply_impulse(&Vector3::new(0.0, 1.0, 0.0), &Point3::new(0.5, 0.0, 0.0));
        assert_relative_eq!(body.velocity(), Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(
            body.angular_velocity(),
            Vector3::new(0.0, 0.0, 0.5 / i),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_directed_impulse_matches_point_impulse() {
        let mut a = unit_cube_at(Point3::origin()).with_orientation(UnitQuaternion::from_euler_angles(
            0.3, -0.2, 0.7,
        ));
        let mut b = a.clone();
        let point = Point3::new(0.5, -0.5, 0.2);
        let n = Vector3::new(0.0, 1.0, 0.0);

        a.apply_impulse(&(n * 2.0), &point);

        let lever = point - b.center_of_mass();
        let multiplier = lever.cross(&n) / &b.inertia_view();
        b.apply_directed_impulse(&n, &multiplier, 2.0);

        assert_relative_eq!(a.velocity(), b.velocity(), epsilon = 1e-12);
        assert_relative_eq!(a.angular_velocity(), b.angular_velocity(), epsilon = 1e-12);
    }

    #[test]
    fn test_commit_movement_under_gravity() {
        let mut body = unit_cube_at(Point3::new(0.0, 5.0, 0.0))
            .with_velocity(Vector3::new(1.0, 0.0, 0.0))
            .with_forces([Force::constant(
                Vector3::zeros(),
                Vector3::new(0.0, -9.8, 0.0),
                f64::INFINITY,
            )]);

        body.begin_time_step();
        body.commit_movement(0.5);
        body.commit_movement(0.25);
        body.commit_movement(1.0);

        assert_relative_eq!(body.current_time(), 1.0);
        assert_relative_eq!(body.velocity(), Vector3::new(1.0, -9.8, 0.0), epsilon = 1e-9);
        assert_relative_eq!(
            body.center_of_mass(),
            Point3::new(1.0, 5.0 - 4.9, 0.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_commit_drops_expired_forces() {
        let mut body = unit_cube_at(Point3::origin()).with_forces([Force::constant(
            Vector3::zeros(),
            Vector3::new(2.0, 0.0, 0.0),
            0.5,
        )]);

        body.begin_time_step();
        body.commit_movement(0.5);
        assert!(body.forces().is_empty());
        assert_relative_eq!(body.velocity().x, 1.0, epsilon = 1e-12);

        body.commit_movement(1.0);
        assert_relative_eq!(body.velocity().x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_project_does_not_commit() {
        let body = unit_cube_at(Point3::origin())
            .with_velocity(Vector3::new(0.0, 0.0, 2.0))
            .with_angular_velocity(Vector3::new(0.0, 1.0, 0.0));

        let projection = body.project(0.5);
        assert_relative_eq!(
            projection.center_of_mass,
            Point3::new(0.0, 0.0, 1.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(projection.orientation.angle(), 0.5, epsilon = 1e-4);
        assert_relative_eq!(body.center_of_mass(), Point3::origin());

        let same = body.project(0.0);
        assert_eq!(same.center_of_mass, body.center_of_mass());
    }

    #[test]
    fn test_energy_and_momentum() {
        let body = unit_cube_at(Point3::origin())
            .with_velocity(Vector3::new(3.0, 4.0, 0.0))
            .with_angular_velocity(Vector3::new(0.0, 0.0, 2.0));

        let i = body.inertia().tensor()[2];
        assert_relative_eq!(body.speed(), 5.0, epsilon = 1e-12);
        assert_relative_eq!(body.momentum(), Vector3::new(3.0, 4.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(body.angular_momentum().z, 2.0 * i, epsilon = 1e-12);
        assert_relative_eq!(body.kinetic_energy(), 12.5 + 2.0 * i, epsilon = 1e-12);
        assert_relative_eq!(body.bounding_radius(), 0.75_f64.sqrt(), epsilon = 1e-12);
    }
}
