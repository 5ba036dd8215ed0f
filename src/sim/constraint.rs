//! Velocity constraints: heuristics that run before an entity moves
//!
//! None of these are physics; they damp numerical jitter that a pure impulse
//! solver can produce in tight spots. They are opt-in per entity.

use std::time::Duration;

use glam::DVec2;

use super::KinematicState;
use crate::consts::{STEP_DURATION, STEP_SECONDS};
use crate::geometry::Position;

/// Hook that may adjust an entity's state once per tick, before it moves
///
/// `check` may run for a tick that gets aborted later, so whatever it
/// remembers about `state` is staged and only kept once `commit` is called.
pub trait VelocityConstraint: Send {
    fn check(&mut self, state: &mut KinematicState);

    /// The tick of the last `check` completed
    fn commit(&mut self) {}
}

/// The default anti-jitter pair
pub fn anti_jitter() -> Vec<Box<dyn VelocityConstraint>> {
    vec![
        Box::new(MaxAccelerationConstraint::new(Duration::from_millis(400), 5.0)),
        Box::new(NotMovingConstraint::new(Duration::from_millis(200))),
    ]
}

/// Number of whole ticks in `window`
fn ticks_in(window: Duration) -> usize {
    (window.as_secs_f64() / STEP_DURATION.as_secs_f64()).round() as usize
}

/// Fixed-capacity ring buffer where age 0 is the most recent element
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    buffer: Vec<T>,
    capacity: usize,
    next: usize,
}

impl<T: Copy> SlidingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            next: 0,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(value);
        } else {
            self.buffer[self.next] = value;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Element pushed `age` pushes ago
    pub fn get(&self, age: usize) -> Option<T> {
        if age >= self.buffer.len() {
            return None;
        }
        let index = (self.next + self.capacity - 1 - age) % self.capacity;
        Some(self.buffer[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.buffer.iter().copied()
    }
}

/// Limits how fast the velocity may drift from the velocity `window` ago
#[derive(Debug, Clone)]
pub struct MaxAccelerationConstraint {
    age: usize,
    threshold: f64,
    history: SlidingWindow<DVec2>,
    staged: Option<DVec2>,
}

impl MaxAccelerationConstraint {
    /// `threshold` is the largest allowed change per axis, in m/s
    pub fn new(window: Duration, threshold: f64) -> Self {
        let age = ticks_in(window);
        Self {
            age,
            threshold,
            history: SlidingWindow::new(age + 1),
            staged: None,
        }
    }
}

impl VelocityConstraint for MaxAccelerationConstraint {
    fn check(&mut self, state: &mut KinematicState) {
        if let Some(reference) = self.history.get(self.age) {
            let change = (state.velocity - reference).clamp(DVec2::splat(-self.threshold), DVec2::splat(self.threshold));
            state.velocity = reference + change;
        }
        self.staged = Some(state.velocity);
    }

    fn commit(&mut self) {
        if let Some(velocity) = self.staged.take() {
            self.history.push(velocity);
        }
    }
}

/// Calms entities that claim to move fast but stay in place
///
/// When even the slowest recent speed should have carried the entity twice
/// as far as it actually went, velocity and spin are halved.
#[derive(Debug, Clone)]
pub struct NotMovingConstraint {
    age: usize,
    speeds: SlidingWindow<f64>,
    positions: SlidingWindow<Position>,
    staged: Option<(Position, f64)>,
}

/// Entities slower than this (m/s, Manhattan) are left alone
const NOT_MOVING_MIN_SPEED: f64 = 0.5;

impl NotMovingConstraint {
    pub fn new(window: Duration) -> Self {
        let age = ticks_in(window);
        Self {
            age,
            speeds: SlidingWindow::new(age),
            positions: SlidingWindow::new(age + 1),
            staged: None,
        }
    }
}

impl VelocityConstraint for NotMovingConstraint {
    fn check(&mut self, state: &mut KinematicState) {
        let speed = state.velocity.x.abs() + state.velocity.y.abs();

        if let Some(old_position) = self.positions.get(self.age) {
            let lowest = self.speeds.iter().fold(speed, f64::min);
            let travelled = old_position.offset_to(state.position).to_meters();
            let actual = travelled.x.abs() + travelled.y.abs();
            let expected = lowest * STEP_SECONDS * self.age as f64;

            if expected > 2.0 * actual && speed > NOT_MOVING_MIN_SPEED {
                state.velocity /= 2.0;
                state.spin = state.spin / 2.0;
            }
        }

        self.staged = Some((state.position, speed));
    }

    fn commit(&mut self) {
        if let Some((position, speed)) = self.staged.take() {
            self.positions.push(position);
            self.speeds.push(speed);
        }
    }
}
