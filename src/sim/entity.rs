//! Dynamic circular entities

use std::fmt;
use std::time::Duration;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::Material;
use super::constraint::{self, VelocityConstraint};
use crate::consts::{NORMAL_MEMORY, STEP_DURATION};
use crate::geometry::Position;
use crate::units::{Angle, Distance, Mass, Spin};

/// Stable identifier of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Mutable view of an entity handed to constraints and controllers
///
/// Changes are written back to the entity once the callback returns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicState {
    pub position: Position,
    /// Velocity in m/s
    pub velocity: DVec2,
    pub angle: Angle,
    pub spin: Spin,
}

/// Per-entity hook that runs once per tick, after the entity moved
pub trait EntityController: Send {
    fn update(&mut self, state: &mut KinematicState);
}

impl<F> EntityController for F
where
    F: FnMut(&mut KinematicState) + Send,
{
    fn update(&mut self, state: &mut KinematicState) {
        self(state)
    }
}

/// Pending request to spawn an entity
pub struct EntitySpawnRequest {
    pub position: Position,
    pub radius: Distance,
    pub material: Material,
    pub velocity: DVec2,
    pub angle: Angle,
    pub spin: Spin,
    pub controller: Option<Box<dyn EntityController>>,
    pub constraints: Vec<Box<dyn VelocityConstraint>>,
}

impl EntitySpawnRequest {
    /// Iron ball at rest
    pub fn new(position: Position, radius: Distance) -> Self {
        Self {
            position,
            radius,
            material: Material::IRON,
            velocity: DVec2::ZERO,
            angle: Angle::ZERO,
            spin: Spin::ZERO,
            controller: None,
            constraints: Vec::new(),
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_velocity(mut self, velocity: DVec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_angle(mut self, angle: Angle) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_spin(mut self, spin: Spin) -> Self {
        self.spin = spin;
        self
    }

    pub fn with_controller(mut self, controller: impl EntityController + 'static) -> Self {
        self.controller = Some(Box::new(controller));
        self
    }

    pub fn with_constraint(mut self, constraint: impl VelocityConstraint + 'static) -> Self {
        self.constraints.push(Box::new(constraint));
        self
    }

    /// Attach the default anti-jitter constraints
    pub fn with_anti_jitter(mut self) -> Self {
        self.constraints.extend(constraint::anti_jitter());
        self
    }
}

impl fmt::Debug for EntitySpawnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySpawnRequest")
            .field("position", &self.position)
            .field("radius", &self.radius)
            .field("material", &self.material)
            .field("velocity", &self.velocity)
            .field("angle", &self.angle)
            .field("spin", &self.spin)
            .field("controller", &self.controller.is_some())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

/// Unit normal of a recent contact, pointing away from the touched surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactNormal {
    pub direction: DVec2,
    /// Friction factor of the touched surface
    pub friction: f64,
}

/// Remembers the most relevant contact normal for a short while
///
/// Rolling needs a surface to roll on even during the ticks in which a
/// resting ball does not register a fresh contact.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalTracker {
    normal: Option<ContactNormal>,
    weight: f64,
    age: Duration,
}

impl NormalTracker {
    pub fn start_tick(&mut self) {
        self.weight = 0.0;
    }

    /// Keep `normal` if it outweighs every contact registered this tick
    pub fn register(&mut self, weight: f64, normal: ContactNormal) {
        if weight > self.weight {
            self.weight = weight;
            self.normal = Some(normal);
            self.age = Duration::ZERO;
        }
    }

    pub fn get(&self) -> Option<ContactNormal> {
        self.normal
    }

    pub fn finish_tick(&mut self) {
        self.age += STEP_DURATION;
        if self.age > NORMAL_MEMORY {
            self.normal = None;
            self.age = Duration::ZERO;
        }
    }
}

/// A simulated ball
///
/// The `wip_*` fields are only meaningful while a tick is in progress. A
/// tick touches nothing else until [`Entity::commit_tick`], so an aborted
/// tick leaves the committed state as it was.
pub(crate) struct Entity {
    pub id: EntityId,
    pub radius: Distance,
    pub material: Material,
    pub mass: Mass,

    pub position: Position,
    pub velocity: DVec2,
    pub angle: Angle,
    pub spin: Spin,

    pub wip_position: Position,
    pub wip_velocity: DVec2,
    pub wip_angle: Angle,
    pub wip_spin: Spin,
    pub wip_normal_tracker: NormalTracker,
    /// Whether the solver already moved this entity during the current tick
    pub wip_moved: bool,

    pub old_position: Position,
    pub old_angle: Angle,

    pub normal_tracker: NormalTracker,
    pub controller: Option<Box<dyn EntityController>>,
    pub constraints: Vec<Box<dyn VelocityConstraint>>,
}

impl Entity {
    pub fn spawn(id: EntityId, request: EntitySpawnRequest) -> Self {
        Self {
            id,
            radius: request.radius,
            material: request.material,
            mass: request.material.ball_mass(request.radius),
            position: request.position,
            velocity: request.velocity,
            angle: request.angle,
            spin: request.spin,
            wip_position: request.position,
            wip_velocity: request.velocity,
            wip_angle: request.angle,
            wip_spin: request.spin,
            wip_normal_tracker: NormalTracker::default(),
            wip_moved: false,
            old_position: request.position,
            old_angle: request.angle,
            normal_tracker: NormalTracker::default(),
            controller: request.controller,
            constraints: request.constraints,
        }
    }

    /// Working state as seen by constraints and controllers
    pub fn kinematic_state(&self) -> KinematicState {
        KinematicState {
            position: self.wip_position,
            velocity: self.wip_velocity,
            angle: self.wip_angle,
            spin: self.wip_spin,
        }
    }

    pub fn apply(&mut self, state: KinematicState) {
        self.wip_position = state.position;
        self.wip_velocity = state.velocity;
        self.wip_angle = state.angle;
        self.wip_spin = state.spin;
    }

    /// Run the velocity constraints on the working state
    ///
    /// Their histories only advance in [`Entity::commit_tick`].
    pub fn run_constraints(&mut self) {
        if self.constraints.is_empty() {
            return;
        }
        let mut state = self.kinematic_state();
        for constraint in &mut self.constraints {
            constraint.check(&mut state);
        }
        self.apply(state);
    }

    pub fn run_controller(&mut self) {
        let mut state = self.kinematic_state();
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        controller.update(&mut state);
        self.apply(state);
    }

    pub fn begin_tick(&mut self) {
        self.wip_position = self.position;
        self.wip_velocity = self.velocity;
        self.wip_angle = self.angle;
        self.wip_spin = self.spin;
        self.wip_normal_tracker = self.normal_tracker;
        self.wip_moved = false;
    }

    pub fn commit_tick(&mut self) {
        self.old_position = self.position;
        self.old_angle = self.angle;
        self.position = self.wip_position;
        self.velocity = self.wip_velocity;
        self.angle = self.wip_angle;
        self.spin = self.wip_spin;
        self.normal_tracker = self.wip_normal_tracker;
        for constraint in &mut self.constraints {
            constraint.commit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal(x: f64, y: f64) -> ContactNormal {
        ContactNormal {
            direction: DVec2::new(x, y),
            friction: 1.0,
        }
    }

    #[test]
    fn test_normal_tracker_keeps_heaviest() {
        let mut tracker = NormalTracker::default();
        tracker.start_tick();
        tracker.register(0.3, normal(1.0, 0.0));
        tracker.register(0.7, normal(0.0, 1.0));
        tracker.register(0.5, normal(-1.0, 0.0));
        assert_eq!(tracker.get(), Some(normal(0.0, 1.0)));
    }

    #[test]
    fn test_normal_tracker_forgets() {
        let mut tracker = NormalTracker::default();
        tracker.start_tick();
        tracker.register(1.0, normal(0.0, 1.0));
        tracker.finish_tick();

        // 100 ms of memory at 10 ms per tick
        for _ in 0..9 {
            tracker.start_tick();
            tracker.finish_tick();
            assert!(tracker.get().is_some());
        }
        tracker.start_tick();
        tracker.finish_tick();
        assert!(tracker.get().is_none());
    }

    #[test]
    fn test_controller_closure() {
        let request = EntitySpawnRequest::new(Position::ORIGIN, Distance::meters(0.1))
            .with_controller(|state: &mut KinematicState| state.velocity.x += 1.0);
        let mut entity = Entity::spawn(EntityId(1), request);
        entity.begin_tick();
        entity.run_controller();
        assert_eq!(entity.wip_velocity, DVec2::new(1.0, 0.0));
        assert_eq!(entity.velocity, DVec2::ZERO);

        entity.commit_tick();
        assert_eq!(entity.velocity, DVec2::new(1.0, 0.0));
    }

    #[test]
    fn test_uncommitted_tick_keeps_state() {
        let request = EntitySpawnRequest::new(Position::ORIGIN, Distance::meters(0.1))
            .with_spin(Spin::radians_per_second(2.0))
            .with_controller(|state: &mut KinematicState| {
                state.angle += Angle::from_degrees(90.0);
                state.spin = Spin::ZERO;
            });
        let mut entity = Entity::spawn(EntityId(1), request);
        entity.begin_tick();
        entity.wip_normal_tracker.start_tick();
        entity.wip_normal_tracker.register(1.0, normal(0.0, 1.0));
        entity.run_controller();

        assert_eq!(entity.angle, Angle::ZERO);
        assert_eq!(entity.spin, Spin::radians_per_second(2.0));
        assert!(entity.normal_tracker.get().is_none());

        // The next tick starts over from the committed state
        entity.begin_tick();
        assert_eq!(entity.wip_spin, Spin::radians_per_second(2.0));
        assert!(entity.wip_normal_tracker.get().is_none());
    }
}
