//! Mass properties of solid bodies.
//!
//! An [`InertiaTensor`] holds the mass, center of mass and the symmetric
//! 3×3 inertia tensor of one body, expressed in the body's own frame. The
//! tensor is stored as its upper triangle:
//!
//! ```text
//! [0] = Ixx   [1] = Iyy   [2] = Izz
//! [3] = Ixy   [4] = Iyz   [5] = Ixz
//! ```
//!
//! Orientation dependent quantities go through an [`InertiaTensorView`],
//! which re-expresses the tensor as `R·I·Rᵗ` without touching the stored one.
//!
//! Immovable bodies carry an infinite mass, an all-infinite tensor and an
//! all-zero inverse, so every impulse formula that multiplies by the inverse
//! yields no response.
//!
//! # Example
//!
//! ```
//! use rbd_types::InertiaTensor;
//! use nalgebra::{Point3, Vector3};
//!
//! let inertia = InertiaTensor::new([2.0, 2.0, 2.0, 0.0, 0.0, 0.0], Point3::origin(), 1.0);
//! let omega = Vector3::new(1.0, 0.0, 0.0) / &inertia;
//! assert!((omega.x - 0.5).abs() < 1e-12);
//! ```

use std::ops::{Div, Mul};

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::EPSILON;

/// Symmetric tensor stored as its upper triangle.
pub type SymmetricTensor = [f64; 6];

const ZERO_TENSOR: SymmetricTensor = [0.0; 6];
const INFINITE_TENSOR: SymmetricTensor = [f64::INFINITY; 6];

/// Mass, center of mass and inertia tensor of a single body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InertiaTensor {
    tensor: SymmetricTensor,
    inverse: SymmetricTensor,
    center_of_mass: Point3<f64>,
    mass: f64,
}

impl InertiaTensor {
    /// Create from a precomputed tensor, center of mass and mass.
    ///
    /// The inverse is computed here. An infinite mass always gets a zero
    /// inverse, whatever the supplied tensor holds.
    #[must_use]
    pub fn new(tensor: SymmetricTensor, center_of_mass: Point3<f64>, mass: f64) -> Self {
        let inverse = if mass.is_infinite() {
            ZERO_TENSOR
        } else {
            invert_inertia_tensor(&tensor)
        };

        Self {
            tensor,
            inverse,
            center_of_mass,
            mass,
        }
    }

    /// Create the mass properties of an immovable body.
    #[must_use]
    pub fn immovable(center_of_mass: Point3<f64>) -> Self {
        Self {
            tensor: INFINITE_TENSOR,
            inverse: ZERO_TENSOR,
            center_of_mass,
            mass: f64::INFINITY,
        }
    }

    /// Compute mass properties of a closed, outward-wound triangle mesh.
    ///
    /// Uses the surface-integral formulation: every triangle contributes to
    /// the order 0, 1 and 2 volume moments through per-axis polynomials of
    /// its vertex coordinates. The tensor is assembled about the origin,
    /// shifted to the center of mass with the parallel-axis theorem and then
    /// scaled by `density`.
    ///
    /// A density of `+∞` marks an immovable body; its center of mass is the
    /// mean of `points`. A zero-volume mesh is tolerated: the center of mass
    /// falls back to the origin and a warning is logged.
    #[must_use]
    pub fn from_polyhedron(points: &[Point3<f64>], triangles: &[[usize; 3]], density: f64) -> Self {
        if density.is_infinite() {
            let center = if points.is_empty() {
                Point3::origin()
            } else {
                let sum = points
                    .iter()
                    .fold(Vector3::zeros(), |acc, p| acc + p.coords);
                Point3::from(sum / points.len() as f64)
            };
            return Self::immovable(center);
        }

        let integrals = volume_integrals(points, triangles);
        let mass = integrals[0];

        let center_of_mass = if mass == 0.0 {
            warn!(
                triangles = triangles.len(),
                "polyhedron has zero volume, center of mass defaults to the origin"
            );
            Point3::origin()
        } else {
            Point3::new(
                integrals[1] / mass,
                integrals[2] / mass,
                integrals[3] / mass,
            )
        };
        let (cx, cy, cz) = (center_of_mass.x, center_of_mass.y, center_of_mass.z);

        // Tensor about the origin.
        let mut tensor = [
            integrals[5] + integrals[6],
            integrals[4] + integrals[6],
            integrals[4] + integrals[5],
            -integrals[7],
            -integrals[8],
            -integrals[9],
        ];

        // Parallel-axis shift to the center of mass.
        tensor[0] -= mass * (cy * cy + cz * cz);
        tensor[1] -= mass * (cz * cz + cx * cx);
        tensor[2] -= mass * (cx * cx + cy * cy);
        tensor[3] += mass * cx * cy;
        tensor[4] += mass * cy * cz;
        tensor[5] += mass * cx * cz;

        for entry in &mut tensor {
            *entry *= density;
        }

        Self::new(tensor, center_of_mass, mass * density)
    }

    /// The stored tensor (body frame).
    #[must_use]
    pub fn tensor(&self) -> &SymmetricTensor {
        &self.tensor
    }

    /// The stored inverse tensor (body frame).
    #[must_use]
    pub fn inverse_tensor(&self) -> &SymmetricTensor {
        &self.inverse
    }

    /// Center of mass in world coordinates.
    #[must_use]
    pub fn center_of_mass(&self) -> Point3<f64> {
        self.center_of_mass
    }

    /// Total mass.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// `1 / mass`, zero for an immovable body.
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.mass.is_infinite() {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Check whether this body is immovable.
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.mass.is_infinite()
    }

    /// Check whether the mass is zero (degenerate geometry).
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.mass == 0.0
    }

    /// Translate the center of mass, leaving the tensor untouched.
    pub fn move_center_of_mass(&mut self, delta: &Vector3<f64>) {
        self.center_of_mass += delta;
    }

    /// Re-express the tensor under `orientation`.
    #[must_use]
    pub fn view(&self, orientation: &UnitQuaternion<f64>) -> InertiaTensorView {
        InertiaTensorView::new(self, orientation)
    }

    /// The stored tensor as a full matrix.
    #[must_use]
    pub fn to_matrix(&self) -> Matrix3<f64> {
        symmetric_to_matrix(&self.tensor)
    }

    /// The stored inverse as a full matrix.
    #[must_use]
    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        symmetric_to_matrix(&self.inverse)
    }

    /// `I * v`.
    #[must_use]
    pub fn apply(&self, v: &Vector3<f64>) -> Vector3<f64> {
        symmetric_mul(&self.tensor, v)
    }

    /// `v / I`, i.e. `I⁻¹ * v`.
    #[must_use]
    pub fn apply_inverse(&self, v: &Vector3<f64>) -> Vector3<f64> {
        symmetric_mul(&self.inverse, v)
    }
}

/// An inertia tensor re-expressed under a given orientation.
///
/// Transient by nature: build one whenever an orientation dependent quantity
/// is needed and drop it afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertiaTensorView {
    tensor: SymmetricTensor,
    inverse: SymmetricTensor,
}

impl InertiaTensorView {
    /// Compute `R·I·Rᵗ` and invert the rotated tensor directly.
    #[must_use]
    pub fn new(inertia: &InertiaTensor, orientation: &UnitQuaternion<f64>) -> Self {
        if inertia.is_infinite() {
            return Self {
                tensor: inertia.tensor,
                inverse: inertia.inverse,
            };
        }

        let rotation = orientation.to_rotation_matrix().into_inner();
        let rotated = rotation * inertia.to_matrix() * rotation.transpose();
        let tensor = matrix_to_symmetric(&rotated);

        Self {
            tensor,
            inverse: invert_inertia_tensor(&tensor),
        }
    }

    /// The rotated tensor.
    #[must_use]
    pub fn tensor(&self) -> &SymmetricTensor {
        &self.tensor
    }

    /// The inverse of the rotated tensor.
    #[must_use]
    pub fn inverse_tensor(&self) -> &SymmetricTensor {
        &self.inverse
    }

    /// `I * v`.
    #[must_use]
    pub fn apply(&self, v: &Vector3<f64>) -> Vector3<f64> {
        symmetric_mul(&self.tensor, v)
    }

    /// `v / I`.
    #[must_use]
    pub fn apply_inverse(&self, v: &Vector3<f64>) -> Vector3<f64> {
        symmetric_mul(&self.inverse, v)
    }
}

impl Div<&InertiaTensor> for Vector3<f64> {
    type Output = Vector3<f64>;

    fn div(self, rhs: &InertiaTensor) -> Self::Output {
        rhs.apply_inverse(&self)
    }
}

impl Mul<Vector3<f64>> for &InertiaTensor {
    type Output = Vector3<f64>;

    fn mul(self, rhs: Vector3<f64>) -> Self::Output {
        self.apply(&rhs)
    }
}

impl Div<&InertiaTensorView> for Vector3<f64> {
    type Output = Vector3<f64>;

    fn div(self, rhs: &InertiaTensorView) -> Self::Output {
        rhs.apply_inverse(&self)
    }
}

impl Mul<Vector3<f64>> for &InertiaTensorView {
    type Output = Vector3<f64>;

    fn mul(self, rhs: Vector3<f64>) -> Self::Output {
        self.apply(&rhs)
    }
}

/// Invert a symmetric tensor by cofactor expansion.
///
/// A determinant smaller in magnitude than [`EPSILON`] yields the zero
/// tensor: degenerate shapes simply get no angular response.
#[must_use]
pub fn invert_inertia_tensor(t: &SymmetricTensor) -> SymmetricTensor {
    let c0 = t[1] * t[2] - t[4] * t[4];
    let c1 = t[0] * t[2] - t[5] * t[5];
    let c2 = t[0] * t[1] - t[3] * t[3];
    let c3 = t[4] * t[5] - t[3] * t[2];
    let c4 = t[3] * t[5] - t[0] * t[4];
    let c5 = t[3] * t[4] - t[1] * t[5];

    let det = t[0] * c0 + t[3] * c3 + t[5] * c5;
    if !det.is_finite() || det.abs() < EPSILON {
        return ZERO_TENSOR;
    }

    let inv_det = 1.0 / det;
    [
        c0 * inv_det,
        c1 * inv_det,
        c2 * inv_det,
        c3 * inv_det,
        c4 * inv_det,
        c5 * inv_det,
    ]
}

fn symmetric_mul(t: &SymmetricTensor, v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(
        t[0] * v.x + t[3] * v.y + t[5] * v.z,
        t[3] * v.x + t[1] * v.y + t[4] * v.z,
        t[5] * v.x + t[4] * v.y + t[2] * v.z,
    )
}

fn symmetric_to_matrix(t: &SymmetricTensor) -> Matrix3<f64> {
    Matrix3::new(t[0], t[3], t[5], t[3], t[1], t[4], t[5], t[4], t[2])
}

fn matrix_to_symmetric(m: &Matrix3<f64>) -> SymmetricTensor {
    [
        m[(0, 0)],
        m[(1, 1)],
        m[(2, 2)],
        m[(0, 1)],
        m[(1, 2)],
        m[(0, 2)],
    ]
}

/// Per-axis sub-expressions of one triangle's vertex coordinates.
struct Subexpressions {
    f1: f64,
    f2: f64,
    f3: f64,
    g0: f64,
    g1: f64,
    g2: f64,
}

impl Subexpressions {
    fn new(w0: f64, w1: f64, w2: f64) -> Self {
        let temp0 = w0 + w1;
        let f1 = temp0 + w2;
        let temp1 = w0 * w0;
        let temp2 = temp1 + w1 * temp0;
        let f2 = temp2 + w2 * f1;
        let f3 = w0 * temp1 + w1 * temp2 + w2 * f2;

        Self {
            f1,
            f2,
            f3,
            g0: f2 + w0 * (f1 + w0),
            g1: f2 + w1 * (f1 + w1),
            g2: f2 + w2 * (f1 + w2),
        }
    }
}

/// Volume integrals `[1, x, y, z, x², y², z², xy, yz, zx]` of a closed mesh.
fn volume_integrals(points: &[Point3<f64>], triangles: &[[usize; 3]]) -> [f64; 10] {
    let mut integrals = [0.0; 10];

    for (index, triangle) in triangles.iter().enumerate() {
        let (Some(p0), Some(p1), Some(p2)) = (
            points.get(triangle[0]),
            points.get(triangle[1]),
            points.get(triangle[2]),
        ) else {
            warn!(index, "triangle references a missing vertex, skipped");
            continue;
        };

        let d = (p1 - p0).cross(&(p2 - p0));
        let sx = Subexpressions::new(p0.x, p1.x, p2.x);
        let sy = Subexpressions::new(p0.y, p1.y, p2.y);
        let sz = Subexpressions::new(p0.z, p1.z, p2.z);

        integrals[0] += d.x * sx.f1;
        integrals[1] += d.x * sx.f2;
        integrals[2] += d.y * sy.f2;
        integrals[3] += d.z * sz.f2;
        integrals[4] += d.x * sx.f3;
        integrals[5] += d.y * sy.f3;
        integrals[6] += d.z * sz.f3;
        integrals[7] += d.x * (p0.y * sx.g0 + p1.y * sx.g1 + p2.y * sx.g2);
        integrals[8] += d.y * (p0.z * sy.g0 + p1.z * sy.g1 + p2.z * sy.g2);
        integrals[9] += d.z * (p0.x * sz.g0 + p1.x * sz.g1 + p2.x * sz.g2);
    }

    integrals[0] /= 6.0;
    for integral in &mut integrals[1..4] {
        *integral /= 24.0;
    }
    for integral in &mut integrals[4..7] {
        *integral /= 60.0;
    }
    for integral in &mut integrals[7..10] {
        *integral /= 120.0;
    }

    integrals
}
