//! Cached collision outcomes.
//!
//! The world remembers the last test between every pair of bodies it has
//! looked at. Each body owns a [`TrackingInfo`] mapping partners to a
//! [`CollisionInfo`], plus a cached copy of its earliest pending collision.
//! Entries are created lazily, so storage grows with the number of tested
//! pairs rather than with the square of the body count.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use rbd_types::{BodyId, CollisionType, EPSILON};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outcome of the last collision test against one partner.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollisionInfo {
    point: Point3<f64>,
    normal: Vector3<f64>,
    time: f64,
    last_time: f64,
    kind: CollisionType,
    repeats: u32,
}

impl CollisionInfo {
    /// Record a fresh test result.
    #[must_use]
    pub fn new(point: Point3<f64>, normal: Vector3<f64>, time: f64, kind: CollisionType) -> Self {
        Self {
            point,
            normal,
            time,
            last_time: time,
            kind,
            repeats: 0,
        }
    }

    /// A result reporting no collision.
    #[must_use]
    pub fn none() -> Self {
        Self::new(
            Point3::origin(),
            Vector3::zeros(),
            f64::INFINITY,
            CollisionType::None,
        )
    }

    /// Overwrite with a newer test result.
    ///
    /// The repeat counter survives only while the reported time stays put.
    pub fn update(&mut self, point: Point3<f64>, normal: Vector3<f64>, time: f64, kind: CollisionType) {
        if (time - self.last_time).abs() > EPSILON {
            self.repeats = 0;
        }

        self.point = point;
        self.normal = normal;
        self.time = time;
        self.last_time = time;
        self.kind = kind;
    }

    /// Promote an uncertain result after a retest confirmed it.
    pub fn successful_retest_update(&mut self, point: Point3<f64>, normal: Vector3<f64>) {
        self.point = point;
        self.normal = normal;
        self.kind = self.kind.to_certain();
    }

    /// Forget the collision. The last seen time is kept.
    pub fn void(&mut self) {
        self.time = f64::INFINITY;
        self.kind = CollisionType::None;
    }

    /// Count another collision without time advancing.
    ///
    /// Returns `true`, and marks the pair as sliding, once the same pair has
    /// collided twice at the same time.
    pub fn switch_to_sliding(&mut self) -> bool {
        self.repeats += 1;
        if self.repeats > 1 {
            self.kind = CollisionType::Sliding;
            true
        } else {
            false
        }
    }

    /// Contact point. Zero while the result is uncertain.
    #[must_use]
    pub fn point(&self) -> Point3<f64> {
        if self.kind.is_uncertain() {
            Point3::origin()
        } else {
            self.point
        }
    }

    /// Contact normal, pointing toward the tracked body. Zero while the
    /// result is uncertain.
    #[must_use]
    pub fn normal(&self) -> Vector3<f64> {
        if self.kind.is_uncertain() {
            Vector3::zeros()
        } else {
            self.normal
        }
    }

    /// Time of the collision within the current segment.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Classification of the collision.
    #[must_use]
    pub fn kind(&self) -> CollisionType {
        self.kind
    }

    /// Number of collisions seen at an unchanged time.
    #[must_use]
    pub fn repeats(&self) -> u32 {
        self.repeats
    }
}

impl Default for CollisionInfo {
    fn default() -> Self {
        Self::none()
    }
}

/// Earliest pending collision of a body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FirstCollision {
    /// The partner that will be hit first.
    pub partner: BodyId,
    /// When.
    pub time: f64,
    /// How.
    pub kind: CollisionType,
}

/// Collision results of one body against all the partners it was tested with.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackingInfo {
    collisions: HashMap<BodyId, CollisionInfo>,
    first: Option<FirstCollision>,
}

impl TrackingInfo {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the result against `partner`.
    pub fn update(
        &mut self,
        partner: BodyId,
        point: Point3<f64>,
        normal: Vector3<f64>,
        time: f64,
        kind: CollisionType,
    ) {
        self.collisions
            .entry(partner)
            .and_modify(|info| info.update(point, normal, time, kind))
            .or_insert_with(|| CollisionInfo::new(point, normal, time, kind));

        match self.first {
            Some(first) if first.partner == partner => self.find_first_collision(),
            Some(first) if time >= first.time => {}
            _ if kind == CollisionType::None => {}
            _ => {
                self.first = Some(FirstCollision {
                    partner,
                    time,
                    kind,
                });
            }
        }
    }

    /// Promote the uncertain result against `partner` after a retest.
    ///
    /// Returns `false` if the pair was never tested.
    pub fn successful_retest_update(
        &mut self,
        partner: BodyId,
        point: Point3<f64>,
        normal: Vector3<f64>,
    ) -> bool {
        let Some(info) = self.collisions.get_mut(&partner) else {
            return false;
        };
        info.successful_retest_update(point, normal);

        if let Some(first) = self.first.as_mut() {
            if first.partner == partner {
                first.kind = first.kind.to_certain();
            }
        }
        true
    }

    /// Void the result against `partner`.
    pub fn void_collision(&mut self, partner: BodyId) {
        if let Some(info) = self.collisions.get_mut(&partner) {
            info.void();
        }

        if self.first.is_some_and(|first| first.partner == partner) {
            self.find_first_collision();
        }
    }

    /// Void every result held by this tracker.
    pub fn void_all(&mut self) {
        for info in self.collisions.values_mut() {
            info.void();
        }
        self.first = None;
    }

    /// Drop `partner` entirely.
    pub fn remove_partner(&mut self, partner: BodyId) {
        self.collisions.remove(&partner);
        if self.first.is_some_and(|first| first.partner == partner) {
            self.find_first_collision();
        }
    }

    /// Cached result against `partner`.
    #[must_use]
    pub fn get(&self, partner: BodyId) -> Option<&CollisionInfo> {
        self.collisions.get(&partner)
    }

    /// Mutable result against `partner`.
    pub fn get_mut(&mut self, partner: BodyId) -> Option<&mut CollisionInfo> {
        self.collisions.get_mut(&partner)
    }

    /// Earliest pending collision, if any.
    #[must_use]
    pub fn first_collision(&self) -> Option<FirstCollision> {
        self.first
    }

    /// All cached results, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &CollisionInfo)> {
        self.collisions.iter().map(|(id, info)| (*id, info))
    }

    /// Number of partners tested.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collisions.len()
    }

    /// Check whether no partner was tested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collisions.is_empty()
    }

    /// Rescan the cache. Ties go to the smaller partner id so the choice
    /// does not depend on hash order.
    fn find_first_collision(&mut self) {
        self.first = self
            .collisions
            .iter()
            .filter(|(_, info)| info.kind() != CollisionType::None && info.time().is_finite())
            .min_by(|(id_a, a), (id_b, b)| a.time().total_cmp(&b.time()).then(id_a.cmp(id_b)))
            .map(|(id, info)| FirstCollision {
                partner: *id,
                time: info.time(),
                kind: info.kind(),
            });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn id(n: u64) -> BodyId {
        BodyId::new(n)
    }

    fn hit(tracker: &mut TrackingInfo, partner: u64, time: f64, kind: CollisionType) {
        tracker.update(id(partner), Point3::new(1.0, 2.0, 3.0), Vector3::y(), time, kind);
    }

    #[test]
    fn test_collision_info_uncertain_reads_zero() {
        let mut info = CollisionInfo::new(
            Point3::new(1.0, 2.0, 3.0),
            Vector3::x(),
            0.5,
            CollisionType::PossiblyColliding,
        );
        assert_eq!(info.point(), Point3::origin());
        assert_eq!(info.normal(), Vector3::zeros());

        info.successful_retest_update(Point3::new(4.0, 5.0, 6.0), Vector3::z());
        assert_eq!(info.kind(), CollisionType::Colliding);
        assert_eq!(info.point(), Point3::new(4.0, 5.0, 6.0));
        assert_eq!(info.normal(), Vector3::z());
        assert_eq!(info.time(), 0.5);
    }

    #[test]
    fn test_collision_info_void() {
        let mut info =
            CollisionInfo::new(Point3::origin(), Vector3::y(), 0.25, CollisionType::Colliding);
        info.void();
        assert_eq!(info.kind(), CollisionType::None);
        assert_eq!(info.time(), f64::INFINITY);
        assert_eq!(CollisionInfo::default().kind(), CollisionType::None);
    }

    #[test]
    fn test_switch_to_sliding_after_repeat() {
        let mut info =
            CollisionInfo::new(Point3::origin(), Vector3::y(), 0.25, CollisionType::Colliding);
        assert!(!info.switch_to_sliding());
        assert_eq!(info.kind(), CollisionType::Colliding);

        // Same time again keeps the count.
        info.void();
        info.update(Point3::origin(), Vector3::y(), 0.25, CollisionType::Colliding);
        assert!(info.switch_to_sliding());
        assert_eq!(info.kind(), CollisionType::Sliding);
    }

    #[test]
    fn test_repeats_reset_when_time_moves() {
        let mut info =
            CollisionInfo::new(Point3::origin(), Vector3::y(), 0.25, CollisionType::Colliding);
        assert!(!info.switch_to_sliding());

        info.update(Point3::origin(), Vector3::y(), 0.5, CollisionType::Colliding);
        assert_eq!(info.repeats(), 0);
        assert!(!info.switch_to_sliding());
    }

    #[test]
    fn test_tracking_first_collision() {
        let mut tracker = TrackingInfo::new();
        hit(&mut tracker, 3, f64::INFINITY, CollisionType::None);
        assert!(tracker.first_collision().is_none());

        hit(&mut tracker, 4, 0.5, CollisionType::Colliding);
        hit(&mut tracker, 5, 0.25, CollisionType::Sliding);
        hit(&mut tracker, 6, 0.75, CollisionType::Colliding);

        let first = tracker.first_collision().unwrap();
        assert_eq!(first.partner, id(5));
        assert_eq!(first.time, 0.25);
        assert_eq!(first.kind, CollisionType::Sliding);
        assert_eq!(tracker.len(), 4);
    }

    #[test]
    fn test_tracking_first_recomputed_on_later_update() {
        let mut tracker = TrackingInfo::new();
        hit(&mut tracker, 1, 0.2, CollisionType::Colliding);
        hit(&mut tracker, 2, 0.4, CollisionType::Colliding);

        hit(&mut tracker, 1, 0.9, CollisionType::Colliding);
        let first = tracker.first_collision().unwrap();
        assert_eq!(first.partner, id(2));
        assert_eq!(first.time, 0.4);
    }

    #[test]
    fn test_tracking_void_collision() {
        let mut tracker = TrackingInfo::new();
        hit(&mut tracker, 1, 0.2, CollisionType::Colliding);
        hit(&mut tracker, 2, 0.4, CollisionType::PossiblyColliding);

        tracker.void_collision(id(1));
        let voided = tracker.get(id(1)).unwrap();
        assert_eq!(voided.kind(), CollisionType::None);
        assert_eq!(voided.time(), f64::INFINITY);

        let first = tracker.first_collision().unwrap();
        assert_eq!(first.partner, id(2));

        assert!(tracker.successful_retest_update(id(2), Point3::origin(), Vector3::x()));
        assert_eq!(tracker.first_collision().unwrap().kind, CollisionType::Colliding);
        assert!(!tracker.successful_retest_update(id(9), Point3::origin(), Vector3::x()));

        tracker.void_collision(id(2));
        assert!(tracker.first_collision().is_none());
        // Voiding an untested partner is harmless.
        tracker.void_collision(id(7));
    }

    #[test]
    fn test_tracking_remove_partner() {
        let mut tracker = TrackingInfo::new();
        hit(&mut tracker, 1, 0.2, CollisionType::Colliding);
        hit(&mut tracker, 2, 0.3, CollisionType::Colliding);

        tracker.remove_partner(id(1));
        assert!(tracker.get(id(1)).is_none());
        assert_eq!(tracker.first_collision().unwrap().partner, id(2));

        tracker.void_all();
        assert!(tracker.first_collision().is_none());
        assert!(tracker.iter().all(|(_, info)| info.kind() == CollisionType::None));
    }

    #[test]
    fn test_tie_breaks_on_partner_id() {
        let mut tracker = TrackingInfo::new();
        hit(&mut tracker, 8, 0.5, CollisionType::Colliding);
        hit(&mut tracker, 3, 0.5, CollisionType::Colliding);
        hit(&mut tracker, 9, 0.1, CollisionType::Colliding);
        tracker.void_collision(id(9));

        assert_eq!(tracker.first_collision().unwrap().partner, id(3));
    }
}
