//! Geometric primitives for circles and line segments
//!
//! Points are fixed-point, so every routine here works in coordinates relative
//! to one of its inputs: the difference between two positions is exact, and
//! only that (small) difference is converted to floating point.

mod distance;
mod margin;
mod sweep;

use std::ops::{Add, AddAssign, Neg, Sub};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::units::Distance;

pub use distance::{closest_point_on_segment, distance_point_to_segment, distance_segment_to_segment};
pub use margin::create_margin;
pub use sweep::{SweepResult, sweep_circle_to_circle, sweep_circle_to_segment};

/// An absolute point in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: Distance,
    pub y: Distance,
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: Distance::ZERO,
        y: Distance::ZERO,
    };

    #[inline]
    pub const fn new(x: Distance, y: Distance) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn meters(x: f64, y: f64) -> Self {
        Self::new(Distance::meters(x), Distance::meters(y))
    }

    #[inline]
    pub fn millimeters(x: f64, y: f64) -> Self {
        Self::new(Distance::millimeters(x), Distance::millimeters(y))
    }

    /// Exact offset from `self` to `other`
    #[inline]
    pub fn offset_to(self, other: Position) -> Offset {
        Offset::new(other.x - self.x, other.y - self.y)
    }

    /// Point displaced by `meters`, rounded to the fixed-point grid
    #[inline]
    pub fn displaced(self, meters: DVec2) -> Position {
        self + Offset::from_meters(meters)
    }

    #[inline]
    pub fn distance(self, other: Position) -> Distance {
        self.offset_to(other).length()
    }

    /// Component-wise linear blend, used for interpolation
    pub fn lerp(self, target: Position, mixer: f64) -> Position {
        self.displaced(self.offset_to(target).to_meters() * mixer)
    }

    /// Whether either coordinate lies beyond `limit`
    #[inline]
    pub fn is_beyond(self, limit: Distance) -> bool {
        self.x.abs() > limit || self.y.abs() > limit
    }
}

impl Add<Offset> for Position {
    type Output = Position;

    #[inline]
    fn add(self, rhs: Offset) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign<Offset> for Position {
    #[inline]
    fn add_assign(&mut self, rhs: Offset) {
        *self = *self + rhs;
    }
}

impl Sub<Offset> for Position {
    type Output = Position;

    #[inline]
    fn sub(self, rhs: Offset) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// An exact fixed-point displacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Offset {
    pub x: Distance,
    pub y: Distance,
}

impl Offset {
    pub const ZERO: Offset = Offset {
        x: Distance::ZERO,
        y: Distance::ZERO,
    };

    #[inline]
    pub const fn new(x: Distance, y: Distance) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn meters(x: f64, y: f64) -> Self {
        Self::new(Distance::meters(x), Distance::meters(y))
    }

    #[inline]
    pub fn from_meters(meters: DVec2) -> Self {
        Self::meters(meters.x, meters.y)
    }

    #[inline]
    pub fn to_meters(self) -> DVec2 {
        DVec2::new(self.x.to_meters(), self.y.to_meters())
    }

    #[inline]
    pub fn length(self) -> Distance {
        Distance::from_meters(self.to_meters().length())
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    /// Half of this offset, rounding toward zero
    #[inline]
    pub fn halved(self) -> Offset {
        Offset::new(self.x / 2, self.y / 2)
    }
}

impl Add for Offset {
    type Output = Offset;

    #[inline]
    fn add(self, rhs: Offset) -> Offset {
        Offset::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Offset {
    type Output = Offset;

    #[inline]
    fn sub(self, rhs: Offset) -> Offset {
        Offset::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Offset {
    type Output = Offset;

    #[inline]
    fn neg(self) -> Offset {
        Offset::new(-self.x, -self.y)
    }
}

/// A line segment given by its start point and its (possibly zero) length vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Position,
    pub length: Offset,
}

impl LineSegment {
    #[inline]
    pub const fn new(start: Position, length: Offset) -> Self {
        Self { start, length }
    }

    /// Segment with all coordinates in metres
    pub fn meters(start_x: f64, start_y: f64, length_x: f64, length_y: f64) -> Self {
        Self::new(Position::meters(start_x, start_y), Offset::meters(length_x, length_y))
    }

    #[inline]
    pub fn end(&self) -> Position {
        self.start + self.length
    }

    pub fn bounds(&self) -> Aabb {
        let end = self.end();
        Aabb::new(
            Position::new(self.start.x.min(end.x), self.start.y.min(end.y)),
            Position::new(self.start.x.max(end.x), self.start.y.max(end.y)),
        )
    }
}

/// Axis-aligned box with inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Position,
    pub max: Position,
}

impl Aabb {
    #[inline]
    pub const fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    /// Square box of half-size `radius` around `center`
    pub fn around(center: Position, radius: Distance) -> Self {
        let extent = Offset::new(radius, radius);
        Self::new(center - extent, center + extent)
    }

    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.min.y <= other.max.y
            && self.max.x >= other.min.x
            && self.max.y >= other.min.y
    }

    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    #[inline]
    pub fn center(&self) -> Position {
        Position::new(
            self.min.x + (self.max.x - self.min.x) / 2,
            self.min.y + (self.max.y - self.min.y) / 2,
        )
    }
}

/// A circle collider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Position,
    pub radius: Distance,
}

impl Circle {
    #[inline]
    pub const fn new(center: Position, radius: Distance) -> Self {
        Self { center, radius }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_exact() {
        let far = Position::meters(9000.0, -9000.0);
        let near = far + Offset::new(Distance::from_micros(3), Distance::from_micros(-5));
        assert_eq!(far.offset_to(near), Offset::new(Distance::from_micros(3), Distance::from_micros(-5)));
        assert_eq!(near.offset_to(far), -far.offset_to(near));
    }

    #[test]
    fn test_segment_bounds() {
        let segment = LineSegment::meters(5.0, 2.0, -3.0, 4.0);
        let bounds = segment.bounds();
        assert_eq!(bounds.min, Position::meters(2.0, 2.0));
        assert_eq!(bounds.max, Position::meters(5.0, 6.0));
        assert_eq!(segment.end(), Position::meters(2.0, 6.0));
    }

    #[test]
    fn test_aabb_intersects_inclusive() {
        let a = Aabb::new(Position::meters(0.0, 0.0), Position::meters(1.0, 1.0));
        let b = Aabb::new(Position::meters(1.0, 1.0), Position::meters(2.0, 2.0));
        let c = Aabb::new(Position::meters(1.5, 0.0), Position::meters(2.0, 2.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(Aabb::around(Position::ORIGIN, Distance::meters(10.0)).contains(&a));
    }

    #[test]
    fn test_halved_offset() {
        let offset = Offset::new(Distance::from_micros(5), Distance::from_micros(-5));
        assert_eq!(offset.halved(), Offset::new(Distance::from_micros(2), Distance::from_micros(-2)));
        assert!(Offset::new(Distance::from_micros(1), Distance::ZERO).halved().is_zero());
    }
}
