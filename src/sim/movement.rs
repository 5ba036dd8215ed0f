//! Per-entity continuous collision detection and response
//!
//! Each tick, every entity is moved in turn:
//!
//! 1. gravity is integrated into its working velocity, which gives the
//!    intended displacement (`delta`) for this step
//! 2. candidate tiles and entities are collected from the broad-phase
//! 3. the displacement is swept against all candidates
//! 4. the entity moves up to the first contact (never further than its safe
//!    radius allows)
//! 5. simultaneous contacts exchange impulses
//! 6. while part of the step is left, steps 3-5 are retried with the new
//!    velocity, so one step can contain several consecutive collisions
//! 7. rolling turns contact slip into spin (and back)

use glam::DVec2;
use log::{debug, error, trace};

use super::clustering::EntityClustering;
use super::entity::{ContactNormal, Entity};
use super::error::SolverError;
use super::tile::{TileId, TileTree};
use super::EntityId;
use crate::consts::{
    MARGIN_DISTANCE, MAX_ANGULAR_ACCELERATION, MAX_RETRY_STEPS, MAX_SWEEP_PASSES, MIN_RETRY_DELTA,
    SAFE_RADIUS_FACTOR, SAFE_RADIUS_MARGIN, SIMULTANEOUS_CONTACT_TOLERANCE, STEP_SECONDS,
};
use crate::geometry::{
    Aabb, Circle, LineSegment, Offset, Position, SweepResult, create_margin, distance_point_to_segment,
    sweep_circle_to_circle, sweep_circle_to_segment,
};
use crate::units::{Distance, Spin};

/// Moment of inertia of a solid ball is 0.4 m r², so a spin change of
/// 1 rad/s is worth a tangential speed change of r / 2.5 m/s
const SPIN_TO_SPEED_DIVISOR: f64 = 2.5;
/// Rolling friction per second at full friction factors
const ROLLING_FRICTION: f64 = 0.3;
/// Entity impulses may not push harder than this multiple of the relative momentum
const PUSH_THRESHOLD: f64 = 2.0;
/// Contact points further apart than this multiple of the contact radius are bogus
const MAX_CONTACT_STRETCH: f64 = 1.1;

/// Either kind of collider an entity can touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColliderId {
    Tile(TileId),
    Entity(EntityId),
}

/// The other entity of an entity-entity contact
#[derive(Debug, Clone, Copy)]
struct ContactPartner {
    index: u32,
    mass: f64,
}

/// A contact found by one of the sweeps
#[derive(Debug, Clone, Copy)]
struct Intersection {
    /// Center of the moving entity at first contact
    my: Position,
    /// Touched point of a tile, or the center of the touched entity
    other: Position,
    /// Distance between `my` and `other` at touching distance
    radius: Distance,
    /// Travel from the working position to `my`
    delta: Distance,
    bounce: f64,
    friction: f64,
    collider: ColliderId,
    partner: Option<ContactPartner>,
}

impl Intersection {
    fn validate(&self) -> Result<(), SolverError> {
        let separation = self.my.offset_to(self.other).to_meters();
        let radius = self.radius.to_meters();
        if separation.length_squared() > radius * (radius * MAX_CONTACT_STRETCH) {
            error!(
                "invalid intersection between {:?} and {:?} with radius {}",
                self.my, self.other, self.radius
            );
            return Err(SolverError::InvalidIntersection {
                separation: Distance::from_meters(separation.length()),
                radius: self.radius,
            });
        }
        Ok(())
    }

    /// Vector from the touched collider to the entity, in contact radii
    ///
    /// Sweeps stop a contact skin short of touching, so this is slightly
    /// longer than a unit vector.
    fn scaled_separation(&self) -> DVec2 {
        self.other.offset_to(self.my).to_meters() / self.radius.to_meters()
    }

    /// Unit normal pointing from the touched collider toward the entity
    fn normal(&self) -> DVec2 {
        self.scaled_separation().normalize_or_zero()
    }
}

/// How strongly travelling along `direction` pushes into a contact with `normal`
#[inline]
fn intersection_factor(normal: DVec2, direction: DVec2) -> f64 {
    (-direction.dot(normal)).max(0.0)
}

/// The movement solver
///
/// One instance is reused for all entities of a scene; its buffers keep their
/// capacity between entities and ticks.
#[derive(Debug)]
pub(crate) struct EntityMovement {
    gravity: f64,

    intersections: Vec<Intersection>,
    proper_intersections: Vec<usize>,
    processed: Vec<ColliderId>,

    interesting_tiles: Vec<u32>,
    interesting_entities: Vec<u32>,
    query_tiles: Vec<u32>,
    tree_work: Vec<u32>,
    current_tiles: Vec<u32>,
    next_tiles: Vec<u32>,
    margin_entities: Vec<Circle>,
    margin_tiles: Vec<LineSegment>,

    index: usize,
    start: Position,
    delta: Offset,
    original_delta: Distance,
    remaining_budget: f64,
}

impl EntityMovement {
    pub fn new(gravity: f64) -> Self {
        Self {
            gravity,
            intersections: Vec::new(),
            proper_intersections: Vec::new(),
            processed: Vec::new(),
            interesting_tiles: Vec::new(),
            interesting_entities: Vec::new(),
            query_tiles: Vec::new(),
            tree_work: Vec::new(),
            current_tiles: Vec::new(),
            next_tiles: Vec::new(),
            margin_entities: Vec::new(),
            margin_tiles: Vec::new(),
            index: 0,
            start: Position::ORIGIN,
            delta: Offset::ZERO,
            original_delta: Distance::ZERO,
            remaining_budget: 1.0,
        }
    }

    /// Radius around the committed position that bounds any movement of
    /// `entity` during this step
    pub fn safe_radius(&self, entity: &Entity) -> Distance {
        let dx = entity.velocity.x * STEP_SECONDS;
        let dy = (entity.velocity.y - self.gravity * STEP_SECONDS) * STEP_SECONDS;
        let reach = dx.abs() + dy.abs() + SAFE_RADIUS_MARGIN.to_meters() + entity.radius.to_meters();
        Distance::from_meters(SAFE_RADIUS_FACTOR * reach)
    }

    /// Advance entity `index` by one step
    ///
    /// The entity must already be inserted into `clustering`. Other entities
    /// may receive impulses through their working velocity.
    pub fn move_entity(
        &mut self,
        entities: &mut [Entity],
        index: usize,
        tiles: &TileTree,
        clustering: &mut EntityClustering,
    ) -> Result<(), SolverError> {
        self.start(entities, index);
        self.determine_interesting_tiles_and_entities(entities, tiles, clustering);
        self.determine_tile_intersections(entities, tiles)?;
        self.determine_entity_intersections(entities)?;

        self.move_safely(entities, tiles, false)?;
        self.process_intersections(entities)?;

        if !self.intersections.is_empty() && self.original_delta > MIN_RETRY_DELTA {
            self.retry(entities, tiles)?;
        }

        self.process_rotation(entities);
        self.finish(entities);
        Ok(())
    }

    fn start(&mut self, entities: &mut [Entity], index: usize) {
        self.index = index;
        let entity = &mut entities[index];
        entity.wip_normal_tracker.start_tick();
        entity.wip_moved = true;

        // Semi-implicit Euler: gravity first, then displacement
        entity.wip_velocity.y -= self.gravity * STEP_SECONDS;
        self.delta = Offset::from_meters(entity.wip_velocity * STEP_SECONDS);
        self.original_delta = self.delta.length();
        self.start = entity.wip_position;

        self.intersections.clear();
        self.proper_intersections.clear();
        self.processed.clear();
        self.remaining_budget = 1.0;
    }

    fn determine_interesting_tiles_and_entities(
        &mut self,
        entities: &[Entity],
        tiles: &TileTree,
        clustering: &mut EntityClustering,
    ) {
        let entity = &entities[self.index];
        let safe_radius = self.safe_radius(entity);
        let safe_box = Aabb::around(entity.position, safe_radius);

        self.query_tiles.clear();
        self.interesting_tiles.clear();
        tiles.query(&safe_box, &mut self.query_tiles, &mut self.tree_work);
        for &tile in &self.query_tiles {
            let (distance, _) = distance_point_to_segment(entity.wip_position, &tiles.tile(tile).collider);
            if distance < safe_radius {
                self.interesting_tiles.push(tile);
            }
        }

        self.interesting_entities.clear();
        clustering.query(self.index as u32, &mut self.interesting_entities);
    }

    /// Sweep against the candidate tiles, returning the number of passes
    ///
    /// Tiles that sweep as [`SweepResult::Dirty`] are swept again with the
    /// shortest delta found so far, until that delta stops shrinking.
    fn determine_tile_intersections(&mut self, entities: &[Entity], tiles: &TileTree) -> Result<usize, SolverError> {
        let entity = &entities[self.index];
        let mut small_delta = self.delta;
        let mut small_delta_squared = small_delta.to_meters().length_squared();

        self.current_tiles.clear();
        self.current_tiles.extend_from_slice(&self.interesting_tiles);
        self.next_tiles.clear();

        let mut passes = 0;
        while !self.current_tiles.is_empty() && passes < MAX_SWEEP_PASSES {
            passes += 1;
            let old_small_delta_squared = small_delta_squared;
            let current_delta = small_delta;

            for &tile_index in &self.current_tiles {
                let tile = tiles.tile(tile_index);
                match sweep_circle_to_segment(entity.wip_position, current_delta, entity.radius, &tile.collider) {
                    SweepResult::Hit { circle, segment } => {
                        let new_delta = entity.wip_position.offset_to(circle);
                        let new_delta_squared = new_delta.to_meters().length_squared();
                        if new_delta_squared < small_delta_squared {
                            small_delta = new_delta;
                            small_delta_squared = new_delta_squared;
                        }

                        let intersection = Intersection {
                            my: circle,
                            other: segment,
                            radius: entity.radius,
                            delta: new_delta.length(),
                            bounce: tile.material.bounce_factor,
                            friction: tile.material.friction_factor,
                            collider: ColliderId::Tile(tile.id),
                            partner: None,
                        };
                        intersection.validate()?;
                        self.intersections.push(intersection);
                    }
                    SweepResult::Dirty => self.next_tiles.push(tile_index),
                    SweepResult::Miss => {}
                }
            }

            if small_delta_squared == old_small_delta_squared {
                break;
            }
            std::mem::swap(&mut self.current_tiles, &mut self.next_tiles);
            self.next_tiles.clear();
        }

        if passes > 1 {
            trace!("{} needed {passes} tile sweep passes", entity.id);
        }
        Ok(passes as usize)
    }

    fn determine_entity_intersections(&mut self, entities: &[Entity]) -> Result<(), SolverError> {
        let entity = &entities[self.index];
        for &other_index in &self.interesting_entities {
            let other = &entities[other_index as usize];
            let Some(contact) = sweep_circle_to_circle(
                entity.wip_position,
                entity.radius,
                self.delta,
                other.wip_position,
                other.radius,
            ) else {
                continue;
            };

            let intersection = Intersection {
                my: contact,
                other: other.wip_position,
                radius: entity.radius + other.radius,
                delta: entity.wip_position.distance(contact),
                bounce: other.material.bounce_factor,
                friction: other.material.friction_factor,
                collider: ColliderId::Entity(other.id),
                partner: Some(ContactPartner {
                    index: other_index,
                    mass: other.mass.to_kilograms(),
                }),
            };
            intersection.validate()?;
            self.intersections.push(intersection);
        }
        Ok(())
    }

    fn nearest_intersection(&self) -> Option<&Intersection> {
        let mut nearest: Option<&Intersection> = None;
        for intersection in &self.intersections {
            if nearest.is_none_or(|best| intersection.delta < best.delta) {
                nearest = Some(intersection);
            }
        }
        nearest
    }

    /// Move the working position by `delta`, unless that would end inside a collider
    ///
    /// Without `allow_teleport` the move stops at the nearest intersection.
    /// The move is shortened until it stays within the safe radius; failing to
    /// get there is a solver defect.
    fn move_safely(&mut self, entities: &mut [Entity], tiles: &TileTree, allow_teleport: bool) -> Result<(), SolverError> {
        let entity = &entities[self.index];

        if !allow_teleport {
            if let Some(contact) = self.nearest_intersection().map(|nearest| nearest.my) {
                self.delta = entity.wip_position.offset_to(contact);
            }
        }

        let safe_distance = self.safe_radius(entity) - entity.radius - SAFE_RADIUS_MARGIN;
        loop {
            let actual = entity.position.distance(entity.wip_position + self.delta);
            if actual <= safe_distance {
                break;
            }
            if self.delta.is_zero() {
                error!(
                    "{} ended up {} from its committed position, but only {} is safe",
                    entity.id, actual, safe_distance
                );
                return Err(SolverError::SafetyClampDiverged {
                    actual,
                    safe: safe_distance,
                });
            }
            self.delta = self.delta.halved();
        }

        let target = entity.wip_position + self.delta;
        for &other_index in &self.interesting_entities {
            let other = &entities[other_index as usize];
            if target.distance(other.wip_position) <= entity.radius + other.radius {
                return Ok(());
            }
        }
        for &tile in &self.interesting_tiles {
            let (distance, _) = distance_point_to_segment(target, &tiles.tile(tile).collider);
            if distance <= entity.radius {
                return Ok(());
            }
        }

        entities[self.index].wip_position = target;
        Ok(())
    }

    /// Exchange impulses for the nearest (and all simultaneous) contacts
    fn process_intersections(&mut self, entities: &mut [Entity]) -> Result<(), SolverError> {
        let Some(nearest) = self.nearest_intersection().map(|nearest| nearest.delta) else {
            return Ok(());
        };

        self.proper_intersections.clear();
        for (index, intersection) in self.intersections.iter().enumerate() {
            if intersection.delta <= nearest + SIMULTANEOUS_CONTACT_TOLERANCE
                && !self.processed.contains(&intersection.collider)
            {
                self.proper_intersections.push(index);
            }
        }

        self.process_contact_group(entities, true)?;
        self.process_contact_group(entities, false)
    }

    fn process_contact_group(&mut self, entities: &mut [Entity], tile_contacts: bool) -> Result<(), SolverError> {
        let old_velocity = entities[self.index].wip_velocity;
        let speed = old_velocity.length();
        if speed == 0.0 {
            return Ok(());
        }
        let direction = old_velocity / speed;

        let in_group = |intersection: &Intersection| intersection.partner.is_none() == tile_contacts;

        let total_factor: f64 = self
            .proper_intersections
            .iter()
            .map(|&index| &self.intersections[index])
            .filter(|intersection| in_group(intersection))
            .map(|intersection| intersection_factor(intersection.normal(), direction))
            .sum();
        if total_factor <= 0.0 {
            return Ok(());
        }

        for position in 0..self.proper_intersections.len() {
            let intersection = self.intersections[self.proper_intersections[position]];
            if in_group(&intersection) {
                self.process_intersection(entities, &intersection, old_velocity, direction, total_factor)?;
            }
        }
        Ok(())
    }

    fn process_intersection(
        &mut self,
        entities: &mut [Entity],
        intersection: &Intersection,
        old_velocity: DVec2,
        direction: DVec2,
        total_factor: f64,
    ) -> Result<(), SolverError> {
        self.processed.push(intersection.collider);

        let separation = intersection.scaled_separation();
        if separation.length_squared() > MAX_CONTACT_STRETCH {
            error!("contact normal {separation} of {:?} is not a unit vector", intersection.collider);
            return Err(SolverError::InvalidContactNormal {
                length_squared: separation.length_squared(),
            });
        }
        let normal = separation.normalize_or_zero();

        let entity = &mut entities[self.index];
        let factor = intersection_factor(normal, direction) / total_factor;
        entity.wip_normal_tracker.register(
            factor,
            ContactNormal {
                direction: normal,
                friction: intersection.friction,
            },
        );

        let bounce_constant = entity.material.bounce_factor + intersection.bounce + 1.0;
        let opposing_speed = bounce_constant * normal.dot(old_velocity);
        let mass = entity.mass.to_kilograms();
        let mut impulse = normal * (mass * factor * opposing_speed);

        if let Some(partner) = intersection.partner {
            let other = &mut entities[partner.index as usize];
            // Compare against the velocity the partner has during its own move
            let mut other_velocity = other.wip_velocity;
            if !other.wip_moved {
                other_velocity.y -= self.gravity * STEP_SECONDS;
            }
            let relative_speed = (old_velocity - other_velocity).length();
            let push = impulse.length() / (relative_speed * partner.mass);
            if push > PUSH_THRESHOLD {
                impulse /= push / PUSH_THRESHOLD;
            }
            other.wip_velocity += impulse / partner.mass;
        }

        entities[self.index].wip_velocity -= impulse / mass;
        Ok(())
    }

    /// Spend the rest of the step with the post-impact velocity
    fn retry(&mut self, entities: &mut [Entity], tiles: &TileTree) -> Result<(), SolverError> {
        for step in 0..MAX_RETRY_STEPS {
            if step > 0 && self.remaining_budget <= 0.5 {
                break;
            }
            self.update_retry_budget(entities);
            if step > 0 && self.remaining_budget > 0.4 {
                self.try_margin(entities, tiles)?;
            }
            self.retry_step(entities, tiles)?;
        }
        Ok(())
    }

    fn update_retry_budget(&mut self, entities: &[Entity]) {
        let consumed = self.delta.length().to_meters() / self.original_delta.to_meters();
        self.remaining_budget = (self.remaining_budget - consumed).max(0.0);

        let velocity = entities[self.index].wip_velocity;
        self.delta = Offset::from_meters(velocity * (self.remaining_budget * STEP_SECONDS));
    }

    fn retry_step(&mut self, entities: &mut [Entity], tiles: &TileTree) -> Result<(), SolverError> {
        if self.delta.length() < MIN_RETRY_DELTA {
            return Ok(());
        }

        self.intersections.clear();
        self.proper_intersections.clear();
        self.determine_tile_intersections(entities, tiles)?;
        self.determine_entity_intersections(entities)?;
        self.move_safely(entities, tiles, false)?;
        self.process_intersections(entities)
    }

    /// Nudge the entity slightly away from whatever it is touching
    ///
    /// Sweeps that start exactly at touching distance can stall a sliding
    /// entity; a fresh gap of `MARGIN_DISTANCE` lets the next sweep through.
    /// The intended target of the remaining delta is kept. Returns whether
    /// the entity was nudged.
    fn try_margin(&mut self, entities: &mut [Entity], tiles: &TileTree) -> Result<bool, SolverError> {
        let entity = &entities[self.index];

        self.margin_entities.clear();
        self.margin_entities.extend(self.interesting_entities.iter().map(|&index| {
            let other = &entities[index as usize];
            Circle::new(other.wip_position, other.radius)
        }));
        self.margin_tiles.clear();
        self.margin_tiles
            .extend(self.interesting_tiles.iter().map(|&index| tiles.tile(index).collider));

        let mut point = entity.wip_position;
        if !create_margin(&mut point, entity.radius, &self.margin_entities, &self.margin_tiles, MARGIN_DISTANCE) {
            return Ok(false);
        }
        debug!("{} nudged by {:?}", entity.id, entity.wip_position.offset_to(point));

        let old_target = entity.wip_position + self.delta;
        self.delta = entity.wip_position.offset_to(point);
        self.move_safely(entities, tiles, true)?;
        self.delta = entities[self.index].wip_position.offset_to(old_target);
        Ok(true)
    }

    /// Roll on the most relevant recent contact
    fn process_rotation(&mut self, entities: &mut [Entity]) {
        let entity = &mut entities[self.index];
        entity.wip_angle += entity.wip_spin.angle_after(STEP_SECONDS);

        let Some(contact) = entity.wip_normal_tracker.get() else {
            return;
        };
        let normal = contact.direction;
        let radius = entity.radius.to_meters();

        let moved = self.start.offset_to(entity.wip_position).to_meters();
        let rolled_distance = -normal.y * moved.x + normal.x * moved.y;
        let expected_spin = Spin::radians_per_second(rolled_distance / radius / STEP_SECONDS);

        let max_delta_spin = MAX_ANGULAR_ACCELERATION * STEP_SECONDS;
        let delta_spin = Spin::radians_per_second(
            (expected_spin - entity.wip_spin)
                .to_radians_per_second()
                .clamp(-max_delta_spin, max_delta_spin),
        );

        let consumed_speed = delta_spin.surface_speed(entity.radius) / SPIN_TO_SPEED_DIVISOR;
        entity.wip_spin += delta_spin;
        entity.wip_velocity.x += normal.y * consumed_speed;
        entity.wip_velocity.y -= normal.x * consumed_speed;

        let friction_per_second =
            (ROLLING_FRICTION * entity.material.friction_factor * contact.friction).clamp(0.0, 1.0);
        let friction_per_tick = 1.0 - (1.0 - friction_per_second).powf(STEP_SECONDS);
        let tangent = DVec2::new(normal.y, -normal.x);
        let tangential_speed = entity.wip_velocity.dot(tangent);
        entity.wip_velocity -= tangent * (tangential_speed * friction_per_tick);
    }

    fn finish(&mut self, entities: &mut [Entity]) {
        entities[self.index].wip_normal_tracker.finish_tick();
        self.interesting_tiles.clear();
        self.interesting_entities.clear();
        self.intersections.clear();
        self.proper_intersections.clear();
    }
}
