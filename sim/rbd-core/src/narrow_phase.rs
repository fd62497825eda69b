//! Narrow-phase collision detection along body trajectories.
//!
//! The world asks a [`NarrowPhase`] two questions about a pair of bodies
//! moving through the current frame segment:
//!
//! - [`NarrowPhase::has_collided`]: do the surfaces touch anywhere in `[t0, t1]`?
//! - [`NarrowPhase::resolve_collisions`]: when is the earliest touch no later
//!   than a given time, where, and what kind of contact is it?
//!
//! Trajectories come from [`RigidBody::project`], so detection never
//! commits any movement.
//!
//! # Built-in detector
//!
//! [`AabbNarrowPhase`] bounds each body by the axis-aligned box around its
//! world-space vertices. The signed gap between two boxes is the largest
//! per-axis separation; the surfaces touch once it drops to the weld
//! distance. The contact point lies on the vertices of each body that face
//! the other, so a tilted body is hit at its leading corner or edge.
//!
//! A pair is engaged while it touches without pulling apart faster than
//! the resting speed. The earliest engagement is found by uniform sampling
//! followed by bisection. A pair that starts out resting is followed
//! further, and reported again once it has sunk more than the weld distance
//! deeper, so a body rotating into its support is caught mid-segment.
//!
//! ```text
//!   gap(t) ──╮
//!            │   ╲
//!   weld ────┼────╳──────────
//!            │      ╲
//!            t0     toi      t1
//! ```

use nalgebra::{Point3, Vector3};
use rbd_types::{CollisionType, EPSILON, WELD_DISTANCE};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::body::RigidBody;

/// Number of uniform samples taken before bisecting.
const SAMPLES: usize = 8;

/// Number of bisection steps when narrowing a time of impact.
const BISECTION_STEPS: usize = 48;

/// Result of an interval overlap test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Proximity {
    /// The surfaces touch somewhere in the interval.
    Touching,
    /// The surfaces stay apart. Carries the displacement that would bring
    /// body A into contact with body B at the end of the interval.
    Separated(Vector3<f64>),
}

impl Proximity {
    /// Check whether the surfaces touch.
    #[must_use]
    pub fn is_touching(&self) -> bool {
        matches!(self, Self::Touching)
    }
}

/// Point and normal of a contact. The normal points from body B to body A.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// World-space contact point.
    pub point: Point3<f64>,
    /// Unit normal from B to A.
    pub normal: Vector3<f64>,
}

/// Earliest contact found by [`NarrowPhase::resolve_collisions`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    /// Classification of the contact.
    pub kind: CollisionType,
    /// Time of impact. `+∞` when there is none.
    pub time: f64,
    /// Contact geometry, absent when there is no contact.
    pub contact: Option<ContactPoint>,
}

impl Resolution {
    /// No contact in the queried interval.
    #[must_use]
    pub fn none() -> Self {
        Self {
            kind: CollisionType::None,
            time: f64::INFINITY,
            contact: None,
        }
    }
}

/// Collision detection between two moving bodies.
pub trait NarrowPhase: std::fmt::Debug {
    /// Check whether `a` and `b` touch anywhere in `[t0, t1]`.
    fn has_collided(&self, a: &RigidBody, b: &RigidBody, t0: f64, t1: f64) -> Proximity;

    /// Find the earliest contact between `a` and `b` no later than
    /// `time_of_impact`.
    ///
    /// The search starts at the later of the two bodies' committed times.
    /// A zero-length search is a retest and never returns an uncertain
    /// classification.
    fn resolve_collisions(&self, a: &RigidBody, b: &RigidBody, time_of_impact: f64) -> Resolution;
}

/// Axis-aligned bounding box detector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AabbNarrowPhase {
    weld_distance: f64,
    resting_speed: f64,
}

impl Default for AabbNarrowPhase {
    fn default() -> Self {
        Self::new(WELD_DISTANCE, 0.2)
    }
}

impl AabbNarrowPhase {
    /// Create a detector.
    ///
    /// Surfaces closer than `weld_distance` touch. A touching pair whose
    /// normal speed is within `resting_speed` is sliding rather than
    /// colliding.
    #[must_use]
    pub fn new(weld_distance: f64, resting_speed: f64) -> Self {
        Self {
            weld_distance,
            resting_speed,
        }
    }

    /// Contact distance tolerance.
    #[must_use]
    pub fn weld_distance(&self) -> f64 {
        self.weld_distance
    }

    /// Normal speed below which a touching pair is sliding.
    #[must_use]
    pub fn resting_speed(&self) -> f64 {
        self.resting_speed
    }

    fn sample(&self, a: &RigidBody, b: &RigidBody, t: f64) -> Option<Sample> {
        let proj_a = a.project(t);
        let proj_b = b.project(t);
        let vertices_a = a.vertices_at(&proj_a.center_of_mass, &proj_a.orientation);
        let vertices_b = b.vertices_at(&proj_b.center_of_mass, &proj_b.orientation);
        let box_a = Aabb::from_points(&vertices_a)?;
        let box_b = Aabb::from_points(&vertices_b)?;

        let mut gap = f64::NEG_INFINITY;
        let mut axis = 0;
        let mut sign = 1.0;
        for i in 0..3 {
            let a_above = box_a.min[i] - box_b.max[i];
            let a_below = box_b.min[i] - box_a.max[i];
            let (separation, side) = if a_above >= a_below {
                (a_above, 1.0)
            } else {
                (a_below, -1.0)
            };

            if separation > gap {
                gap = separation;
                axis = i;
                sign = side;
            }
        }

        let mut normal = Vector3::zeros();
        normal[axis] = sign;

        // Faces of each box that look at the other body.
        let (face_a, face_b) = if sign > 0.0 {
            (box_a.min[axis], box_b.max[axis])
        } else {
            (box_a.max[axis], box_b.min[axis])
        };
        let patch_a = Aabb::facing(&vertices_a, axis, face_a, self.weld_distance).unwrap_or(box_a);
        let patch_b = Aabb::facing(&vertices_b, axis, face_b, self.weld_distance).unwrap_or(box_b);
        let region = patch_a
            .intersection(&patch_b, axis)
            .or_else(|| box_a.intersection(&box_b, axis))
            .unwrap_or_else(|| box_a.meeting(&box_b));

        let mut point = region.center();
        point[axis] = 0.5 * (face_a + face_b);

        let approach = (proj_b.velocity_at(&point) - proj_a.velocity_at(&point)).dot(&normal);

        Some(Sample {
            gap,
            normal,
            point,
            approach,
        })
    }

    /// Classify a sample. `None` when the surfaces are apart or pulling
    /// away from each other.
    fn classify(&self, sample: &Sample) -> Option<CollisionType> {
        if sample.gap > self.weld_distance {
            None
        } else if sample.approach > self.resting_speed {
            Some(CollisionType::Colliding)
        } else if sample.approach >= -self.resting_speed {
            Some(CollisionType::Sliding)
        } else {
            None
        }
    }

    /// Earliest contact in `[t0, t1]` with its classification.
    fn first_contact(
        &self,
        a: &RigidBody,
        b: &RigidBody,
        t0: f64,
        t1: f64,
    ) -> Option<(f64, Sample, CollisionType)> {
        let start = self.sample(a, b, t0)?;
        match self.classify(&start) {
            Some(CollisionType::Sliding) => {
                let depth = start.gap - self.weld_distance;
                let sunk = self
                    .scan(a, b, t0, t1, |s| s.gap <= depth)
                    .and_then(|(t, s)| self.classify(&s).map(|kind| (t, s, kind)));
                Some(sunk.unwrap_or((t0, start, CollisionType::Sliding)))
            }
            Some(kind) => Some((t0, start, kind)),
            None => {
                let (t, sample) = self.scan(a, b, t0, t1, |s| self.classify(s).is_some())?;
                let kind = self.classify(&sample)?;
                Some((t, sample, kind))
            }
        }
    }

    /// First time in `(t0, t1]` at which `hit` holds, refined by bisection.
    fn scan<F>(&self, a: &RigidBody, b: &RigidBody, t0: f64, t1: f64, hit: F) -> Option<(f64, Sample)>
    where
        F: Fn(&Sample) -> bool,
    {
        if t1 <= t0 {
            return None;
        }

        let mut lo = t0;
        for i in 1..=SAMPLES {
            let t = t0 + (t1 - t0) * (i as f64 / SAMPLES as f64);
            let sample = self.sample(a, b, t)?;
            if hit(&sample) {
                return Some(self.bisect(a, b, lo, t, sample, &hit));
            }
            lo = t;
        }

        None
    }

    /// Narrow `(lo, hi]` down to the first time `hit` holds. `found` is the
    /// sample at `hi`.
    fn bisect<F>(
        &self,
        a: &RigidBody,
        b: &RigidBody,
        mut lo: f64,
        mut hi: f64,
        mut found: Sample,
        hit: &F,
    ) -> (f64, Sample)
    where
        F: Fn(&Sample) -> bool,
    {
        for _ in 0..BISECTION_STEPS {
            if hi - lo <= EPSILON * EPSILON {
                break;
            }

            let mid = 0.5 * (lo + hi);
            match self.sample(a, b, mid) {
                Some(sample) if hit(&sample) => {
                    hi = mid;
                    found = sample;
                }
                _ => lo = mid,
            }
        }

        (hi, found)
    }
}

impl NarrowPhase for AabbNarrowPhase {
    fn has_collided(&self, a: &RigidBody, b: &RigidBody, t0: f64, t1: f64) -> Proximity {
        let t1 = t1.max(t0);
        let touching = |s: &Sample| s.gap <= self.weld_distance;
        match self.sample(a, b, t0) {
            Some(start) if touching(&start) => return Proximity::Touching,
            Some(_) => {
                if self.scan(a, b, t0, t1, touching).is_some() {
                    return Proximity::Touching;
                }
            }
            None => {}
        }

        match self.sample(a, b, t1) {
            Some(end) => Proximity::Separated(end.normal * -(end.gap - self.weld_distance)),
            None => Proximity::Separated(Vector3::repeat(f64::INFINITY)),
        }
    }

    fn resolve_collisions(&self, a: &RigidBody, b: &RigidBody, time_of_impact: f64) -> Resolution {
        let t0 = a.current_time().max(b.current_time());
        let t1 = time_of_impact.max(t0);

        let Some((time, sample, kind)) = self.first_contact(a, b, t0, t1) else {
            return Resolution::none();
        };
        let (point, normal) = (sample.point, sample.normal);

        let rotating = a.angular_velocity().norm() > EPSILON || b.angular_velocity().norm() > EPSILON;
        let kind = if t1 > t0 && rotating {
            kind.to_uncertain()
        } else {
            kind
        };

        Resolution {
            kind,
            time,
            contact: Some(ContactPoint { point, normal }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn from_points(points: &[Point3<f64>]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(
            Self {
                min: *first,
                max: *first,
            },
            |acc, p| Self {
                min: acc.min.inf(p),
                max: acc.max.sup(p),
            },
        ))
    }

    /// Box around the vertices within `tolerance` of `face` along `axis`.
    fn facing(points: &[Point3<f64>], axis: usize, face: f64, tolerance: f64) -> Option<Self> {
        let near: Vec<Point3<f64>> = points
            .iter()
            .filter(|p| (p[axis] - face).abs() <= tolerance)
            .copied()
            .collect();
        Self::from_points(&near)
    }

    /// Overlap of two boxes on every axis but `skip`.
    fn intersection(&self, other: &Self, skip: usize) -> Option<Self> {
        let min = self.min.sup(&other.min);
        let max = self.max.inf(&other.max);
        (0..3)
            .all(|i| i == skip || min[i] <= max[i])
            .then_some(Self { min, max })
    }

    /// Box spanned by the overlap bounds even when they cross.
    fn meeting(&self, other: &Self) -> Self {
        Self {
            min: self.min.sup(&other.min),
            max: self.max.inf(&other.max),
        }
    }

    fn center(&self) -> Point3<f64> {
        Point3::from((self.min.coords + self.max.coords) * 0.5)
    }
}

/// Gap, contact geometry and normal speed of a pair at one instant.
#[derive(Debug, Clone, Copy)]
struct Sample {
    gap: f64,
    normal: Vector3<f64>,
    point: Point3<f64>,
    approach: f64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::force::Force;
    use crate::shapes::{cube, cuboid};
    use approx::assert_relative_eq;

    fn cube_at(x: f64, y: f64, velocity: Vector3<f64>) -> RigidBody {
        RigidBody::from_mesh(cube(1.0, Point3::new(x, y, 0.0)), 1.0)
            .unwrap()
            .with_velocity(velocity)
    }

    fn ground() -> RigidBody {
        RigidBody::immovable(cuboid(Vector3::new(50.0, 0.5, 50.0)).translated(Vector3::new(0.0, -0.5, 0.0)))
            .unwrap()
    }

    #[test]
    fn test_head_on_time_of_impact() {
        let a = cube_at(-2.0, 0.0, Vector3::new(9.0, 0.0, 0.0));
        let b = cube_at(2.0, 0.0, Vector3::new(-9.0, 0.0, 0.0));
        let narrow = AabbNarrowPhase::default();

        let resolution = narrow.resolve_collisions(&a, &b, 0.5);
        assert_eq!(resolution.kind, CollisionType::Colliding);
        assert_relative_eq!(resolution.time, (3.0 - WELD_DISTANCE) / 18.0, epsilon = 1e-9);

        let contact = resolution.contact.unwrap();
        assert_relative_eq!(contact.normal, Vector3::new(-1.0, 0.0, 0.0));
        assert_relative_eq!(contact.point, Point3::origin(), epsilon = 1e-9);
    }

    #[test]
    fn test_no_contact_before_limit() {
        let a = cube_at(-2.0, 0.0, Vector3::new(9.0, 0.0, 0.0));
        let b = cube_at(2.0, 0.0, Vector3::new(-9.0, 0.0, 0.0));
        let narrow = AabbNarrowPhase::default();

        let resolution = narrow.resolve_collisions(&a, &b, 0.1);
        assert_eq!(resolution.kind, CollisionType::None);
        assert_eq!(resolution.time, f64::INFINITY);
        assert!(resolution.contact.is_none());

        match narrow.has_collided(&a, &b, 0.0, 0.1) {
            Proximity::Separated(displacement) => {
                // Faces are 3 - 1.8 apart after 0.1 s.
                assert_relative_eq!(displacement.x, 1.2 - WELD_DISTANCE, epsilon = 1e-9);
            }
            Proximity::Touching => panic!("cubes should still be apart"),
        }
        assert!(narrow.has_collided(&a, &b, 0.0, 0.2).is_touching());
    }

    #[test]
    fn test_falling_onto_ground() {
        let body = cube_at(0.0, 2.5, Vector3::zeros()).with_forces([Force::constant(
            Vector3::zeros(),
            Vector3::new(0.0, -9.8, 0.0),
            f64::INFINITY,
        )]);
        let floor = ground();
        let narrow = AabbNarrowPhase::default();

        let resolution = narrow.resolve_collisions(&body, &floor, 1.0);
        let expected = (2.0 * (2.0 - WELD_DISTANCE) / 9.8).sqrt();
        assert_eq!(resolution.kind, CollisionType::Colliding);
        assert_relative_eq!(resolution.time, expected, epsilon = 1e-8);
        assert_relative_eq!(resolution.contact.unwrap().normal, Vector3::y());
    }

    #[test]
    fn test_resting_contact_is_sliding() {
        let body = cube_at(0.0, 0.5 + 0.5 * WELD_DISTANCE, Vector3::new(1.0, 0.0, 0.0));
        let floor = ground();
        let narrow = AabbNarrowPhase::default();

        let resolution = narrow.resolve_collisions(&body, &floor, 0.5);
        assert_eq!(resolution.kind, CollisionType::Sliding);
        assert_eq!(resolution.time, 0.0);
        assert_relative_eq!(
            resolution.contact.unwrap().point,
            Point3::new(0.0, 0.25 * WELD_DISTANCE, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_sinking_contact_reported_again() {
        let body = cube_at(0.0, 0.5 + 0.5 * WELD_DISTANCE, Vector3::new(0.0, -0.05, 0.0));
        let narrow = AabbNarrowPhase::default();

        // Sinking one weld distance deeper at 0.05 m/s takes 0.02 s.
        let resolution = narrow.resolve_collisions(&body, &ground(), 0.5);
        assert_eq!(resolution.kind, CollisionType::Sliding);
        assert_relative_eq!(resolution.time, WELD_DISTANCE / 0.05, epsilon = 1e-9);
    }

    #[test]
    fn test_tilted_body_hit_at_leading_corner() {
        let tilt = nalgebra::UnitQuaternion::from_euler_angles(0.3, 0.2, 0.4);
        let body = cube_at(0.0, 2.0, Vector3::new(0.0, -5.0, 0.0)).with_orientation(tilt);
        let narrow = AabbNarrowPhase::default();

        let resolution = narrow.resolve_collisions(&body, &ground(), 1.0);
        assert_eq!(resolution.kind, CollisionType::Colliding);

        let lowest = body
            .vertices()
            .into_iter()
            .min_by(|p, q| p.y.total_cmp(&q.y))
            .unwrap();
        let point = resolution.contact.unwrap().point;
        assert_relative_eq!(point.x, lowest.x, epsilon = 1e-9);
        assert_relative_eq!(point.z, lowest.z, epsilon = 1e-9);
        assert_relative_eq!(point.y, 0.5 * WELD_DISTANCE, epsilon = 1e-9);
    }

    #[test]
    fn test_bounced_pair_is_followed_to_next_touch() {
        // Leaving the ground at 1 m/s under gravity, back after about 0.2 s.
        let body = cube_at(0.0, 0.5, Vector3::new(0.0, 1.0, 0.0)).with_forces([Force::constant(
            Vector3::zeros(),
            Vector3::new(0.0, -9.8, 0.0),
            f64::INFINITY,
        )]);
        let narrow = AabbNarrowPhase::default();

        let resolution = narrow.resolve_collisions(&body, &ground(), 0.5);
        assert!(resolution.kind.is_contact());
        assert!(resolution.time > 0.15 && resolution.time < 0.21, "{}", resolution.time);
    }

    #[test]
    fn test_separating_contact_is_ignored() {
        let body = cube_at(0.0, 0.5, Vector3::new(0.0, 3.0, 0.0));
        let narrow = AabbNarrowPhase::default();

        let resolution = narrow.resolve_collisions(&body, &ground(), 0.5);
        assert_eq!(resolution.kind, CollisionType::None);
    }

    #[test]
    fn test_rotation_makes_result_uncertain() {
        let a = cube_at(-2.0, 0.0, Vector3::new(9.0, 0.0, 0.0))
            .with_angular_velocity(Vector3::new(0.0, 0.0, 0.5));
        let b = cube_at(2.0, 0.0, Vector3::new(-9.0, 0.0, 0.0));
        let narrow = AabbNarrowPhase::default();

        let resolution = narrow.resolve_collisions(&a, &b, 0.5);
        assert_eq!(resolution.kind, CollisionType::PossiblyColliding);

        // A zero-length retest at the found time is certain.
        let mut a = a;
        let mut b = b;
        a.begin_time_step();
        b.begin_time_step();
        a.commit_movement(resolution.time);
        b.commit_movement(resolution.time);
        let retest = narrow.resolve_collisions(&a, &b, resolution.time);
        assert_eq!(retest.kind, CollisionType::Colliding);
        assert_relative_eq!(retest.time, resolution.time);
    }

    #[test]
    fn test_empty_bodies_never_touch() {
        let narrow = AabbNarrowPhase::default();
        let a = RigidBody::new(
            Vec::new(),
            Vec::new(),
            rbd_types::InertiaTensor::immovable(Point3::origin()),
        )
        .unwrap();
        let b = a.clone();

        assert_eq!(narrow.resolve_collisions(&a, &b, 1.0), Resolution::none());
        assert!(!narrow.has_collided(&a, &b, 0.0, 1.0).is_touching());
    }
}
