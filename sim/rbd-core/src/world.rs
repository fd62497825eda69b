//! Simulation world container and frame-segment orchestration.
//!
//! The [`World`] owns every body, the colliders and the collision cache.
//! [`World::advance_time`] moves the whole scene forward, stopping at each
//! impact in time order so impulses are applied at the moment of contact.

use std::collections::BTreeSet;

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use rbd_types::{
    make_pair_key, BodyId, CollisionType, PairKey, Result, SimError, WorldConfig, EPSILON,
};
use tracing::{debug, info, trace};

use crate::body::RigidBody;
use crate::collider::{Collider, ImpulseReport, RigidBodyCollider};
use crate::force::Force;
use crate::narrow_phase::{AabbNarrowPhase, ContactPoint, NarrowPhase, Resolution};
use crate::tracking::{CollisionInfo, TrackingInfo};

/// Remaining time below this fraction of the request counts as consumed.
const TIME_TOLERANCE: f64 = 1e-12;

/// Time left of `total` after `elapsed`, if any worth stepping.
pub(crate) fn time_remaining(total: f64, elapsed: f64) -> Option<f64> {
    let remaining = total - elapsed;
    (remaining > TIME_TOLERANCE * total.max(1.0)).then_some(remaining)
}

/// The earliest unprocessed collision of a frame segment.
#[derive(Debug, Clone, Copy)]
struct Pending {
    key: PairKey,
    time: f64,
    kind: CollisionType,
}

/// The simulation world containing all bodies.
#[derive(Debug)]
pub struct World {
    /// Simulation configuration.
    config: WorldConfig,
    /// All bodies, indexed by ID.
    bodies: HashMap<BodyId, RigidBody>,
    /// Bodies that are integrated, in ID order.
    moving: BTreeSet<BodyId>,
    /// Cached collision results per body.
    cache: HashMap<BodyId, TrackingInfo>,
    /// Collider used for pairs without an override.
    default_collider: Box<dyn Collider>,
    /// Per-pair collider overrides.
    pair_colliders: HashMap<PairKey, Box<dyn Collider>>,
    /// Collision detector.
    narrow_phase: Box<dyn NarrowPhase>,
    /// Next available body ID.
    next_body_id: u64,
    /// Total simulated time.
    elapsed: f64,
    /// Impacts processed so far.
    collisions_resolved: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::build(WorldConfig::default())
    }
}

impl World {
    /// Create a new empty world.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] if the configuration does not
    /// validate.
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        let default_collider =
            RigidBodyCollider::new(config.default_restitution, config.default_friction);
        let narrow_phase = AabbNarrowPhase::new(config.weld_distance, config.resting_speed);

        Self {
            config,
            bodies: HashMap::new(),
            moving: BTreeSet::new(),
            cache: HashMap::new(),
            default_collider: Box::new(default_collider),
            pair_colliders: HashMap::new(),
            narrow_phase: Box::new(narrow_phase),
            next_body_id: 1,
            elapsed: 0.0,
            collisions_resolved: 0,
        }
    }

    /// Replace the collision detector.
    #[must_use]
    pub fn with_narrow_phase(mut self, narrow_phase: Box<dyn NarrowPhase>) -> Self {
        self.narrow_phase = narrow_phase;
        self
    }

    /// Get the simulation configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Total simulated time.
    #[must_use]
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed
    }

    /// Number of impacts processed so far.
    #[must_use]
    pub fn collisions_resolved(&self) -> u64 {
        self.collisions_resolved
    }

    /// Get the number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Get the number of moving bodies.
    #[must_use]
    pub fn moving_body_count(&self) -> usize {
        self.moving.len()
    }

    /// The ID the next added body will receive.
    #[must_use]
    pub fn next_body_id(&self) -> BodyId {
        BodyId::new(self.next_body_id)
    }

    // =========================================================================
    // Body Management
    // =========================================================================

    /// Add a body that never moves.
    ///
    /// It takes part in collisions with moving bodies but is not integrated.
    pub fn add_body(&mut self, body: RigidBody) -> BodyId {
        let id = self.allocate_id();
        trace!(%id, name = body.name(), "adding static body");
        self.bodies.insert(id, body);
        id
    }

    /// Add a moving body.
    ///
    /// Finite-mass bodies get gravity as a permanent force. The new body is
    /// checked against every existing body straight away, so the cache holds
    /// an entry for each of those pairs on return.
    pub fn add_moving_body(&mut self, mut body: RigidBody) -> BodyId {
        let id = self.allocate_id();

        body.set_integration(self.config.integration);
        body.begin_time_step();
        if !body.is_immovable() && self.config.gravity != Vector3::zeros() {
            let weight = self.config.gravity * body.mass();
            body.apply_force(Force::constant(Vector3::zeros(), weight, f64::INFINITY));
        }

        trace!(%id, name = body.name(), mass = body.mass(), "adding moving body");
        self.bodies.insert(id, body);
        self.moving.insert(id);

        for other in self.body_ids() {
            if other != id {
                self.detect(id, other, 0.0);
            }
        }

        id
    }

    /// Remove a body, purging it from the moving set, the cache and the
    /// collider overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] if the body does not exist.
    pub fn remove_body(&mut self, id: BodyId) -> Result<RigidBody> {
        let body = self
            .bodies
            .remove(&id)
            .ok_or(SimError::InvalidBodyId(id.raw()))?;

        self.moving.remove(&id);
        self.cache.remove(&id);
        for tracker in self.cache.values_mut() {
            tracker.remove_partner(id);
        }
        self.pair_colliders.retain(|key, _| !key.contains(id));

        trace!(%id, "removed body");
        Ok(body)
    }

    /// Get a body by ID.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(&id)
    }

    /// Get a mutable body by ID.
    ///
    /// Changing a body's motion through this handle does not touch the
    /// collision cache; call [`World::void_all_collisions_with`] afterwards.
    #[must_use]
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(&id)
    }

    /// Check whether a body is integrated.
    #[must_use]
    pub fn is_moving(&self, id: BodyId) -> bool {
        self.moving.contains(&id)
    }

    /// All body IDs in ascending order.
    #[must_use]
    pub fn body_ids(&self) -> Vec<BodyId> {
        let mut ids: Vec<BodyId> = self.bodies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// All bodies in ascending ID order.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &RigidBody)> + '_ {
        self.body_ids()
            .into_iter()
            .filter_map(move |id| self.bodies.get(&id).map(|body| (id, body)))
    }

    /// Register a force on a moving body.
    ///
    /// Cached results involving the body are voided and its current
    /// contacts detected again.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] for an unknown body and
    /// [`SimError::BodyNotMoving`] for a body added with [`World::add_body`].
    pub fn apply_force(&mut self, id: BodyId, force: Force) -> Result<()> {
        if !self.moving.contains(&id) {
            return Err(if self.bodies.contains_key(&id) {
                SimError::BodyNotMoving(id.raw())
            } else {
                SimError::InvalidBodyId(id.raw())
            });
        }

        self.body_mut_or_err(id)?.apply_force(force);
        self.refresh_contacts(id);
        Ok(())
    }

    /// Set the velocity of a body, voiding its cached collisions and
    /// detecting its current contacts again.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] if the body does not exist.
    pub fn set_velocity(&mut self, id: BodyId, velocity: Vector3<f64>) -> Result<()> {
        self.body_mut_or_err(id)?.set_velocity(velocity);
        self.refresh_contacts(id);
        Ok(())
    }

    /// Set the angular velocity of a body, voiding its cached collisions and
    /// detecting its current contacts again.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] if the body does not exist.
    pub fn set_angular_velocity(&mut self, id: BodyId, angular_velocity: Vector3<f64>) -> Result<()> {
        self.body_mut_or_err(id)?.set_angular_velocity(angular_velocity);
        self.refresh_contacts(id);
        Ok(())
    }

    /// Void everything cached for `id`, then re-run a zero-length test
    /// against every body it can collide with.
    fn refresh_contacts(&mut self, id: BodyId) {
        self.void_all_collisions_with(id);
        let moving = self.moving.contains(&id);
        for other in self.body_ids() {
            if other != id && (moving || self.moving.contains(&other)) {
                self.detect(id, other, 0.0);
            }
        }
    }

    fn body_mut_or_err(&mut self, id: BodyId) -> Result<&mut RigidBody> {
        self.bodies
            .get_mut(&id)
            .ok_or(SimError::InvalidBodyId(id.raw()))
    }

    fn body_or_err(&self, id: BodyId) -> Result<&RigidBody> {
        self.bodies.get(&id).ok_or(SimError::InvalidBodyId(id.raw()))
    }

    fn allocate_id(&mut self) -> BodyId {
        let id = BodyId::new(self.next_body_id);
        self.next_body_id += 1;
        id
    }

    // =========================================================================
    // Colliders
    // =========================================================================

    /// The collider used for pairs without an override.
    #[must_use]
    pub fn default_collider(&self) -> &dyn Collider {
        self.default_collider.as_ref()
    }

    /// Replace the default collider, returning the previous one.
    pub fn set_default_collider(&mut self, collider: Box<dyn Collider>) -> Box<dyn Collider> {
        std::mem::replace(&mut self.default_collider, collider)
    }

    /// Override the collider for the pair `{a, b}`, returning any override
    /// it replaces.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] if either body does not exist.
    pub fn set_pair_collider(
        &mut self,
        a: BodyId,
        b: BodyId,
        collider: Box<dyn Collider>,
    ) -> Result<Option<Box<dyn Collider>>> {
        self.body_or_err(a)?;
        self.body_or_err(b)?;
        Ok(self.pair_colliders.insert(make_pair_key(a, b), collider))
    }

    /// Remove the collider override for `{a, b}`.
    pub fn remove_pair_collider(&mut self, a: BodyId, b: BodyId) -> Option<Box<dyn Collider>> {
        self.pair_colliders.remove(&make_pair_key(a, b))
    }

    /// The collider that resolves contacts between `a` and `b`.
    #[must_use]
    pub fn collider_for(&self, a: BodyId, b: BodyId) -> &dyn Collider {
        self.pair_colliders
            .get(&make_pair_key(a, b))
            .map_or(self.default_collider.as_ref(), |collider| &**collider)
    }

    // =========================================================================
    // Collision Queries
    // =========================================================================

    /// Cached collision result of `a` against `b`.
    ///
    /// The normal of the returned entry points from `b` toward `a`. Returns
    /// `None` for a pair that was never tested.
    #[must_use]
    pub fn get_collision(&self, a: BodyId, b: BodyId) -> Option<&CollisionInfo> {
        self.cache.get(&a)?.get(b)
    }

    /// Number of unordered pairs whose cached result is a collision.
    #[must_use]
    pub fn collision_count(&self) -> usize {
        self.cache
            .iter()
            .flat_map(|(&id, tracker)| {
                tracker
                    .iter()
                    .filter(move |(partner, info)| id < *partner && info.kind() != CollisionType::None)
            })
            .count()
    }

    /// Reset every cached result involving `id` to "no collision".
    pub fn void_all_collisions_with(&mut self, id: BodyId) {
        if let Some(tracker) = self.cache.get_mut(&id) {
            tracker.void_all();
        }
        for (&owner, tracker) in &mut self.cache {
            if owner != id {
                tracker.void_collision(id);
            }
        }
    }

    /// Check whether `a` and `b` touch at any time within the next `dt`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] if either body does not exist.
    pub fn has_collided(&self, a: BodyId, b: BodyId, dt: f64) -> Result<bool> {
        let body_a = self.body_or_err(a)?;
        let body_b = self.body_or_err(b)?;
        Ok(self
            .narrow_phase
            .has_collided(body_a, body_b, 0.0, dt.max(0.0))
            .is_touching())
    }

    /// Earliest time within the next `dt` at which `a` and `b` touch.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] if either body does not exist.
    pub fn time_of_impact(&self, a: BodyId, b: BodyId, dt: f64) -> Result<Option<f64>> {
        let body_a = self.body_or_err(a)?;
        let body_b = self.body_or_err(b)?;
        let resolution = self.narrow_phase.resolve_collisions(body_a, body_b, dt.max(0.0));
        Ok(resolution.contact.map(|_| resolution.time))
    }

    // =========================================================================
    // Scene Queries
    // =========================================================================

    /// World-space triangles of every body, in ID order.
    #[must_use]
    pub fn scene_triangles(&self) -> Vec<[Point3<f64>; 3]> {
        self.bodies()
            .flat_map(|(_, body)| body.world_triangles())
            .collect()
    }

    /// Total kinetic energy of all bodies.
    #[must_use]
    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies.values().map(RigidBody::kinetic_energy).sum()
    }

    /// Total linear momentum of all bodies.
    #[must_use]
    pub fn total_momentum(&self) -> Vector3<f64> {
        self.bodies
            .values()
            .fold(Vector3::zeros(), |acc, body| acc + body.momentum())
    }

    // =========================================================================
    // Time Stepping
    // =========================================================================

    /// Advance the scene by up to `dt`.
    ///
    /// Time is consumed in frame segments short enough that no point of any
    /// body, spin included, moves further than
    /// [`WorldConfig::max_displacement`]. A segment cut short by a contact
    /// turning into a resting one ends the call early; the return value is
    /// the time actually advanced and the caller should re-invoke for the
    /// remainder. A cut always advances by more than [`EPSILON`]: a contact
    /// that turns resting at the very start of a segment gets an inelastic
    /// impulse where it stands and the segment carries on.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidTimestep`] for a negative or non-finite
    /// `dt`, and [`SimError::Diverged`] when a segment needs more collision
    /// refinements than [`WorldConfig::max_refinement_iterations`]. The world
    /// is left mid-segment in the latter case.
    pub fn advance_time(&mut self, dt: f64) -> Result<f64> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimError::InvalidTimestep(dt));
        }

        let mut elapsed = 0.0;
        while let Some(remaining) = time_remaining(dt, elapsed) {
            let (advanced, cut) = self.advance_segment(remaining)?;
            elapsed += advanced;
            if cut {
                break;
            }
        }

        self.elapsed += elapsed;
        Ok(elapsed)
    }

    /// Run one frame segment of at most `remaining`.
    ///
    /// Returns the segment length and whether it was cut short.
    fn advance_segment(&mut self, remaining: f64) -> Result<(f64, bool)> {
        let ids: Vec<BodyId> = self.moving.iter().copied().collect();

        let max_speed = ids
            .iter()
            .filter_map(|id| self.bodies.get(id))
            .map(|body| body.speed() + body.angular_velocity().norm() * body.bounding_radius())
            .fold(0.0, f64::max);
        let mut t_step = if max_speed > 0.0 {
            (self.config.max_displacement / max_speed).min(remaining)
        } else {
            remaining
        };

        for id in &ids {
            if let Some(body) = self.bodies.get_mut(id) {
                body.begin_time_step();
            }
        }

        self.retest_possibly_sliding();
        self.resolve_resting_contacts(t_step);
        for (i, &a) in ids.iter().enumerate() {
            self.detect_against_all(a, t_step, &ids[..i]);
        }

        let mut processed = 0_usize;
        let mut iterations = 0_usize;
        let mut cut = false;
        while let Some(pending) = self.earliest_pending(t_step) {
            iterations += 1;
            if iterations > self.config.max_refinement_iterations {
                return Err(SimError::diverged(format!(
                    "more than {} collision refinements in one segment",
                    self.config.max_refinement_iterations
                )));
            }

            let (a, b) = (pending.key.first(), pending.key.second());
            if pending.kind == CollisionType::Sliding {
                // A cut must make progress; a contact at the segment start
                // is settled where it stands instead.
                if pending.time > EPSILON {
                    t_step = pending.time;
                    cut = true;
                    break;
                }
                self.settle(a, b, pending.time, t_step);
                continue;
            }

            if self.switch_to_sliding(a, b) {
                info!(pair = %pending.key, time = pending.time, "pair switched to sliding");
                if pending.time > EPSILON {
                    t_step = pending.time;
                    cut = true;
                    break;
                }
                self.settle(a, b, pending.time, t_step);
                continue;
            }

            self.commit_moving(a, pending.time);
            self.commit_moving(b, pending.time);

            let mut kind = pending.kind;
            if kind.is_uncertain() {
                let retest = self.resolve(a, b, pending.time);
                if retest.kind == CollisionType::None || retest.kind.is_uncertain() {
                    trace!(pair = %pending.key, "retest failed");
                    self.void_pair(a, b);
                    self.detect(a, b, t_step);
                    continue;
                }
                self.confirm(a, b, pending.kind, &retest);
                kind = retest.kind;
                if kind == CollisionType::Sliding {
                    if pending.time > EPSILON {
                        t_step = pending.time;
                        cut = true;
                        break;
                    }
                    if self.pair_approaching(a, b) {
                        self.settle(a, b, pending.time, t_step);
                    }
                    continue;
                }
            }

            let Some(contact) = self.contact_of(a, b) else {
                self.void_pair(a, b);
                continue;
            };
            let report = self.collide(a, b, &contact, kind);
            trace!(pair = %pending.key, time = pending.time, impulse = report.total_normal(), "resolved impact");
            self.collisions_resolved += 1;
            processed += 1;

            self.refresh_pair(a, b, t_step);
        }

        for id in &ids {
            if let Some(body) = self.bodies.get_mut(id) {
                body.commit_movement(t_step);
                body.begin_time_step();
            }
        }

        debug!(
            t_step,
            collisions = processed,
            iterations,
            cut,
            "frame segment"
        );
        Ok((t_step, cut))
    }

    /// Retest cached `PossiblySliding` entries at the start of a segment.
    fn retest_possibly_sliding(&mut self) {
        for key in self.cached_pairs(CollisionType::PossiblySliding) {
            let (a, b) = (key.first(), key.second());
            let retest = self.resolve(a, b, 0.0);
            if retest.kind.is_contact() && !retest.kind.is_uncertain() {
                self.confirm(a, b, CollisionType::PossiblySliding, &retest);
            } else {
                self.void_pair(a, b);
            }
        }
    }

    /// Apply an inelastic contact impulse to a pair at `time` and detect
    /// both bodies again for the rest of the segment.
    fn settle(&mut self, a: BodyId, b: BodyId, time: f64, t_step: f64) {
        self.commit_moving(a, time);
        self.commit_moving(b, time);

        let resolution = self.resolve(a, b, time);
        if let Some(contact) = resolution.contact {
            let report = self.collide(a, b, &contact, CollisionType::Sliding);
            trace!(%a, %b, time, impulse = report.total_normal(), "settled contact in place");
        }

        self.refresh_pair(a, b, t_step);
    }

    /// Void and re-detect everything involving the moving bodies of a pair.
    fn refresh_pair(&mut self, a: BodyId, b: BodyId, t_step: f64) {
        for id in [a, b] {
            if self.moving.contains(&id) {
                self.void_all_collisions_with(id);
            }
        }
        for id in [a, b] {
            if self.moving.contains(&id) {
                self.detect_against_all(id, t_step, &[]);
            }
        }
    }

    /// Settle resting contacts: an inelastic impulse with friction, then
    /// support and friction forces for the rest of the segment.
    fn resolve_resting_contacts(&mut self, t_step: f64) {
        for key in self.cached_pairs(CollisionType::Sliding) {
            let (a, b) = (key.first(), key.second());
            let resolution = self.resolve(a, b, 0.0);
            let Some(contact) = resolution.contact else {
                continue;
            };
            if !resolution.kind.is_contact() {
                continue;
            }

            self.collide(a, b, &contact, CollisionType::Sliding);

            let friction = self.collider_for(a, b).friction();
            self.apply_support(a, b, &contact.point, &contact.normal, friction, t_step);
            self.apply_support(b, a, &contact.point, &-contact.normal, friction, t_step);
        }
    }

    /// Add the internal force that keeps `id` from pressing into `partner`.
    ///
    /// `normal` points toward `id`.
    fn apply_support(
        &mut self,
        id: BodyId,
        partner: BodyId,
        point: &Point3<f64>,
        normal: &Vector3<f64>,
        friction: f64,
        t_step: f64,
    ) {
        if !self.moving.contains(&id) {
            return;
        }
        let partner_velocity = match self.bodies.get(&partner) {
            Some(body) => body.velocity_at(point),
            None => return,
        };
        let Some(body) = self.bodies.get_mut(&id) else {
            return;
        };
        if body.is_immovable() {
            return;
        }

        let applied = body.forces().generator_force(
            body.inertia(),
            &body.center_of_mass(),
            &body.velocity(),
            0.0,
        );
        let pressing = applied.dot(normal);
        if pressing >= 0.0 {
            return;
        }
        let support = normal * -pressing;

        let relative = body.velocity_at(point) - partner_velocity;
        let sliding = relative - normal * relative.dot(normal);
        let slide_speed = sliding.norm();
        let drag = if slide_speed > EPSILON && t_step > 0.0 {
            let limit = (friction * support.norm()).min(body.mass() * slide_speed / t_step);
            sliding * (-limit / slide_speed)
        } else {
            Vector3::zeros()
        };

        trace!(%id, %partner, support = -pressing, drag = drag.norm(), "resting contact force");
        body.forces_mut().add_internal(support + drag, Vector3::zeros());
    }

    // =========================================================================
    // Detection and Cache
    // =========================================================================

    /// Detect `id` against every other body except those in `skip`.
    fn detect_against_all(&mut self, id: BodyId, until: f64, skip: &[BodyId]) {
        for other in self.body_ids() {
            if other == id || skip.contains(&other) {
                continue;
            }
            self.detect(id, other, until);
        }
    }

    /// Run the narrow phase on a pair and cache the result both ways.
    ///
    /// Pairs where neither body can take an impulse are cached as apart.
    fn detect(&mut self, a: BodyId, b: BodyId, until: f64) {
        let key = make_pair_key(a, b);
        let resolution = if self.can_respond(key.first(), key.second()) {
            self.resolve(key.first(), key.second(), until)
        } else {
            Resolution::none()
        };
        self.record(key.first(), key.second(), &resolution);
    }

    fn can_respond(&self, a: BodyId, b: BodyId) -> bool {
        [a, b]
            .iter()
            .any(|id| self.bodies.get(id).is_some_and(|body| !body.is_immovable()))
    }

    fn resolve(&self, a: BodyId, b: BodyId, until: f64) -> Resolution {
        match (self.bodies.get(&a), self.bodies.get(&b)) {
            (Some(body_a), Some(body_b)) => {
                self.narrow_phase.resolve_collisions(body_a, body_b, until)
            }
            _ => Resolution::none(),
        }
    }

    /// Cache `resolution`, found with `a` as the first body.
    fn record(&mut self, a: BodyId, b: BodyId, resolution: &Resolution) {
        let (point, normal) = resolution
            .contact
            .map_or((Point3::origin(), Vector3::zeros()), |c| (c.point, c.normal));

        self.cache
            .entry(a)
            .or_default()
            .update(b, point, normal, resolution.time, resolution.kind);
        self.cache
            .entry(b)
            .or_default()
            .update(a, point, -normal, resolution.time, resolution.kind);

        if resolution.kind != CollisionType::None {
            trace!(%a, %b, time = resolution.time, kind = %resolution.kind, "cached collision");
        }
    }

    /// Store a successful retest of a cached `previous` result.
    ///
    /// A retest that confirms the earlier classification keeps the entry
    /// and its repeat count; one that changes it is recorded afresh.
    fn confirm(&mut self, a: BodyId, b: BodyId, previous: CollisionType, retest: &Resolution) {
        let Some(contact) = retest.contact else {
            self.void_pair(a, b);
            return;
        };
        if retest.kind != previous.to_certain() {
            self.record(a, b, retest);
            return;
        }

        let mut confirm = |owner: BodyId, partner: BodyId, normal: Vector3<f64>| {
            self.cache
                .get_mut(&owner)
                .is_some_and(|tracker| tracker.successful_retest_update(partner, contact.point, normal))
        };
        let confirmed_a = confirm(a, b, contact.normal);
        let confirmed_b = confirm(b, a, -contact.normal);
        if !(confirmed_a && confirmed_b) {
            self.record(a, b, retest);
        }
    }

    fn void_pair(&mut self, a: BodyId, b: BodyId) {
        if let Some(tracker) = self.cache.get_mut(&a) {
            tracker.void_collision(b);
        }
        if let Some(tracker) = self.cache.get_mut(&b) {
            tracker.void_collision(a);
        }
    }

    /// Cached contact geometry of `a` against `b`, normal from `b` to `a`.
    fn contact_of(&self, a: BodyId, b: BodyId) -> Option<ContactPoint> {
        let info = self.get_collision(a, b)?;
        if !info.kind().is_contact() || info.kind().is_uncertain() {
            return None;
        }
        Some(ContactPoint {
            point: info.point(),
            normal: info.normal(),
        })
    }

    fn switch_to_sliding(&mut self, a: BodyId, b: BodyId) -> bool {
        let mut switch = |owner: BodyId, partner: BodyId| {
            self.cache
                .get_mut(&owner)
                .and_then(|tracker| tracker.get_mut(partner))
                .is_some_and(CollisionInfo::switch_to_sliding)
        };
        let switched_a = switch(a, b);
        let switched_b = switch(b, a);
        switched_a | switched_b
    }

    /// Unordered pairs whose cached kind is `kind`, in key order.
    fn cached_pairs(&self, kind: CollisionType) -> Vec<PairKey> {
        let mut pairs: Vec<PairKey> = self
            .moving
            .iter()
            .filter_map(|id| self.cache.get(id).map(|tracker| (*id, tracker)))
            .flat_map(|(id, tracker)| {
                tracker
                    .iter()
                    .filter(move |(_, info)| info.kind() == kind)
                    .map(move |(partner, _)| make_pair_key(id, partner))
            })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    /// The earliest cached collision within `[0, t_step]` still to process.
    ///
    /// Resting contacts at the segment start are skipped unless the pair is
    /// closing in; they were settled before detection, and uncertain ones are
    /// retested at the next segment start. Ties go to the smaller pair key.
    fn earliest_pending(&self, t_step: f64) -> Option<Pending> {
        let mut best: Option<Pending> = None;

        for &id in &self.moving {
            let Some(tracker) = self.cache.get(&id) else {
                continue;
            };
            if tracker.first_collision().is_none() {
                continue;
            }

            for (partner, info) in tracker.iter() {
                let kind = info.kind();
                let time = info.time();
                if kind == CollisionType::None || time > t_step {
                    continue;
                }
                if kind.is_sliding() && time <= EPSILON && !self.is_approaching(id, partner, info) {
                    continue;
                }

                let key = make_pair_key(id, partner);
                let earlier = best.map_or(true, |b| (time, key) < (b.time, b.key));
                if earlier {
                    best = Some(Pending { key, time, kind });
                }
            }
        }

        best
    }

    fn pair_approaching(&self, a: BodyId, b: BodyId) -> bool {
        self.get_collision(a, b)
            .is_some_and(|info| self.is_approaching(a, b, info))
    }

    /// Check whether `owner` and `partner` close in on each other at the
    /// cached contact point.
    fn is_approaching(&self, owner: BodyId, partner: BodyId, info: &CollisionInfo) -> bool {
        let (Some(body), Some(other)) = (self.bodies.get(&owner), self.bodies.get(&partner)) else {
            return false;
        };
        let point = info.point();
        let closing = (other.velocity_at(&point) - body.velocity_at(&point)).dot(&info.normal());
        closing > EPSILON
    }

    // =========================================================================
    // Response
    // =========================================================================

    fn commit_moving(&mut self, id: BodyId, t: f64) {
        if self.moving.contains(&id) {
            if let Some(body) = self.bodies.get_mut(&id) {
                body.commit_movement(t);
            }
        }
    }

    /// Apply the pair's collider to `a` and `b`.
    fn collide(
        &mut self,
        a: BodyId,
        b: BodyId,
        contact: &ContactPoint,
        kind: CollisionType,
    ) -> ImpulseReport {
        let Some(mut body_b) = self.bodies.remove(&b) else {
            return ImpulseReport::default();
        };

        let collider = self
            .pair_colliders
            .get(&make_pair_key(a, b))
            .map_or(self.default_collider.as_ref(), |collider| &**collider);
        let report = match self.bodies.get_mut(&a) {
            Some(body_a) => collider.collide(body_a, &mut body_b, &contact.point, &contact.normal, kind),
            None => ImpulseReport::default(),
        };

        self.bodies.insert(b, body_b);
        report
    }
}
