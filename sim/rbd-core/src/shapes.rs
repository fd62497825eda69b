//! Primitive triangle meshes for building bodies.
//!
//! All meshes are closed and wound counter-clockwise when seen from
//! outside, which is what [`InertiaTensor::from_polyhedron`] expects.
//!
//! [`InertiaTensor::from_polyhedron`]: rbd_types::InertiaTensor::from_polyhedron

use nalgebra::{Point3, Vector3};

/// A closed, outward-wound triangle mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,
    /// Vertex indices of each triangle.
    pub triangles: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Move every vertex by `offset`.
    #[must_use]
    pub fn translated(mut self, offset: Vector3<f64>) -> Self {
        for v in &mut self.vertices {
            *v += offset;
        }
        self
    }

    /// Signed enclosed volume. Positive for outward winding.
    ///
    /// Triangles that reference missing vertices contribute nothing.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.triangles
            .iter()
            .filter_map(|&[i, j, k]| {
                let (a, b, c) = (
                    self.vertices.get(i)?.coords,
                    self.vertices.get(j)?.coords,
                    self.vertices.get(k)?.coords,
                );
                Some(a.dot(&b.cross(&c)))
            })
            .sum::<f64>()
            / 6.0
    }
}

/// Box centred on the origin.
///
/// Vertex `i` sits at `(±hx, ±hy, ±hz)` with bit 0 of `i` selecting `+x`,
/// bit 1 `+y` and bit 2 `+z`.
#[must_use]
pub fn cuboid(half_extents: Vector3<f64>) -> TriangleMesh {
    let vertices = (0..8)
        .map(|i| {
            let pick = |bit: usize, h: f64| if i & bit == 0 { -h } else { h };
            Point3::new(
                pick(1, half_extents.x),
                pick(2, half_extents.y),
                pick(4, half_extents.z),
            )
        })
        .collect();

    let triangles = vec![
        // -z
        [0, 2, 1],
        [1, 2, 3],
        // +z
        [4, 5, 6],
        [5, 7, 6],
        // -y
        [0, 1, 5],
        [0, 5, 4],
        // +y
        [2, 6, 7],
        [2, 7, 3],
        // -x
        [0, 4, 6],
        [0, 6, 2],
        // +x
        [1, 3, 7],
        [1, 7, 5],
    ];

    TriangleMesh {
        vertices,
        triangles,
    }
}

/// Cube with edge length `size`, centred on `center`.
#[must_use]
pub fn cube(size: f64, center: Point3<f64>) -> TriangleMesh {
    cuboid(Vector3::repeat(size * 0.5)).translated(center.coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_layout() {
        let mesh = cuboid(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.triangles.len(), 12);
        assert_eq!(mesh.vertices[0], Point3::new(-1.0, -2.0, -3.0));
        assert_eq!(mesh.vertices[7], Point3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.vertices[3], Point3::new(1.0, 2.0, -3.0));
    }

    #[test]
    fn test_cuboid_is_outward_wound() {
        let mesh = cuboid(Vector3::new(0.5, 1.0, 1.5));
        assert_relative_eq!(mesh.volume(), 6.0, epsilon = 1e-12);

        for &[i, j, k] in &mesh.triangles {
            let (a, b, c) = (mesh.vertices[i], mesh.vertices[j], mesh.vertices[k]);
            let normal = (b - a).cross(&(c - a));
            let centroid = (a.coords + b.coords + c.coords) / 3.0;
            assert!(normal.dot(&centroid) > 0.0);
        }
    }

    #[test]
    fn test_every_edge_shared_twice() {
        let mesh = cuboid(Vector3::repeat(1.0));
        let mut directed = Vec::new();
        for &[i, j, k] in &mesh.triangles {
            directed.extend([(i, j), (j, k), (k, i)]);
        }
        for &(from, to) in &directed {
            assert!(directed.contains(&(to, from)));
        }
    }

    #[test]
    fn test_cube_translation() {
        let mesh = cube(2.0, Point3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(mesh.volume(), 8.0, epsilon = 1e-12);
        assert_eq!(mesh.vertices[0], Point3::new(-1.0, 4.0, -1.0));
    }
}
