//! Physical quantity types
//!
//! Distances are fixed-point so that positions are exact regardless of how far
//! they are from the origin. Everything that is only ever used relative to a
//! position (speeds, spins, masses) is a plain float wrapper.
//!
//! Fixed-point overflow is a hard failure: the operators panic, like the
//! integer operators of the standard library do in debug builds.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Micrometres per metre
const MICROS_PER_METER: f64 = 1_000_000.0;

/// A signed distance with a resolution of one micrometre
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Distance(i64);

impl Distance {
    pub const ZERO: Distance = Distance(0);

    #[inline]
    pub const fn from_micros(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw value in micrometres
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Convert from metres, rounding to the nearest micrometre
    ///
    /// Panics when `meters` is not finite or does not fit.
    pub fn from_meters(meters: f64) -> Self {
        let raw = (meters * MICROS_PER_METER).round();
        if !raw.is_finite() || raw > i64::MAX as f64 || raw < i64::MIN as f64 {
            panic!("can't convert {meters}m to a distance");
        }
        Self(raw as i64)
    }

    #[inline]
    pub fn meters(meters: f64) -> Self {
        Self::from_meters(meters)
    }

    #[inline]
    pub fn millimeters(millimeters: f64) -> Self {
        Self::from_meters(millimeters / 1000.0)
    }

    #[inline]
    pub fn to_meters(self) -> f64 {
        self.0 as f64 / MICROS_PER_METER
    }

    #[inline]
    pub fn to_millimeters(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    #[inline]
    pub fn abs(self) -> Self {
        match self.0.checked_abs() {
            Some(raw) => Self(raw),
            None => panic!("distance overflow: abs({self})"),
        }
    }

    #[inline]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.abs() >= 1_000_000 {
            write!(f, "{:.4}m", self.to_meters())
        } else {
            write!(f, "{:.3}mm", self.to_millimeters())
        }
    }
}

impl Add for Distance {
    type Output = Distance;

    #[inline]
    fn add(self, rhs: Distance) -> Distance {
        match self.checked_add(rhs) {
            Some(sum) => sum,
            None => panic!("distance overflow: {self} + {rhs}"),
        }
    }
}

impl Sub for Distance {
    type Output = Distance;

    #[inline]
    fn sub(self, rhs: Distance) -> Distance {
        match self.checked_sub(rhs) {
            Some(difference) => difference,
            None => panic!("distance overflow: {self} - {rhs}"),
        }
    }
}

impl AddAssign for Distance {
    #[inline]
    fn add_assign(&mut self, rhs: Distance) {
        *self = *self + rhs;
    }
}

impl SubAssign for Distance {
    #[inline]
    fn sub_assign(&mut self, rhs: Distance) {
        *self = *self - rhs;
    }
}

impl Neg for Distance {
    type Output = Distance;

    #[inline]
    fn neg(self) -> Distance {
        match self.0.checked_neg() {
            Some(raw) => Distance(raw),
            None => panic!("distance overflow: -{self}"),
        }
    }
}

impl Mul<i64> for Distance {
    type Output = Distance;

    #[inline]
    fn mul(self, rhs: i64) -> Distance {
        match self.0.checked_mul(rhs) {
            Some(raw) => Distance(raw),
            None => panic!("distance overflow: {self} * {rhs}"),
        }
    }
}

impl Div<i64> for Distance {
    type Output = Distance;

    /// Integer division, rounding toward zero
    #[inline]
    fn div(self, rhs: i64) -> Distance {
        Distance(self.0 / rhs)
    }
}

/// An angle that wraps around after a full turn
///
/// A full turn maps onto the whole `i32` range, so wrapping integer
/// arithmetic is exactly angle arithmetic modulo 360 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Angle(i32);

/// Raw angle units per radian
const ANGLE_UNITS_PER_RADIAN: f64 = 4_294_967_296.0 / std::f64::consts::TAU;

impl Angle {
    pub const ZERO: Angle = Angle(0);

    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    pub fn from_radians(radians: f64) -> Self {
        if !radians.is_finite() {
            panic!("can't convert {radians}rad to an angle");
        }
        let wrapped = radians.rem_euclid(std::f64::consts::TAU);
        Self((wrapped * ANGLE_UNITS_PER_RADIAN).round() as i64 as u32 as i32)
    }

    #[inline]
    pub fn from_degrees(degrees: f64) -> Self {
        Self::from_radians(degrees.to_radians())
    }

    /// Angle in radians, in the range [-π, π)
    #[inline]
    pub fn to_radians(self) -> f64 {
        self.0 as f64 / ANGLE_UNITS_PER_RADIAN
    }

    #[inline]
    pub fn to_degrees(self) -> f64 {
        self.to_radians().to_degrees()
    }

    /// Blend toward `target` along the shorter way around
    pub fn lerp(self, target: Angle, mixer: f64) -> Angle {
        let delta = target.0.wrapping_sub(self.0) as f64;
        Angle(self.0.wrapping_add((delta * mixer).round() as i64 as i32))
    }
}

impl Add for Angle {
    type Output = Angle;

    #[inline]
    fn add(self, rhs: Angle) -> Angle {
        Angle(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Angle {
    #[inline]
    fn add_assign(&mut self, rhs: Angle) {
        *self = *self + rhs;
    }
}

impl Sub for Angle {
    type Output = Angle;

    #[inline]
    fn sub(self, rhs: Angle) -> Angle {
        Angle(self.0.wrapping_sub(rhs.0))
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°", self.to_degrees())
    }
}

/// Angular velocity in radians per second (positive is counter-clockwise)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Spin(f64);

impl Spin {
    pub const ZERO: Spin = Spin(0.0);

    #[inline]
    pub const fn radians_per_second(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn degrees_per_second(value: f64) -> Self {
        Self(value.to_radians())
    }

    #[inline]
    pub fn to_radians_per_second(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn to_degrees_per_second(self) -> f64 {
        self.0.to_degrees()
    }

    #[inline]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Angle turned after spinning for `seconds`
    #[inline]
    pub fn angle_after(self, seconds: f64) -> Angle {
        Angle::from_radians(self.0 * seconds)
    }

    /// Surface speed (m/s) of a circle with the given radius
    #[inline]
    pub fn surface_speed(self, radius: Distance) -> f64 {
        self.0 * radius.to_meters()
    }
}

impl Add for Spin {
    type Output = Spin;

    #[inline]
    fn add(self, rhs: Spin) -> Spin {
        Spin(self.0 + rhs.0)
    }
}

impl AddAssign for Spin {
    #[inline]
    fn add_assign(&mut self, rhs: Spin) {
        self.0 += rhs.0;
    }
}

impl Sub for Spin {
    type Output = Spin;

    #[inline]
    fn sub(self, rhs: Spin) -> Spin {
        Spin(self.0 - rhs.0)
    }
}

impl Neg for Spin {
    type Output = Spin;

    #[inline]
    fn neg(self) -> Spin {
        Spin(-self.0)
    }
}

impl Mul<f64> for Spin {
    type Output = Spin;

    #[inline]
    fn mul(self, rhs: f64) -> Spin {
        Spin(self.0 * rhs)
    }
}

impl Div<f64> for Spin {
    type Output = Spin;

    #[inline]
    fn div(self, rhs: f64) -> Spin {
        Spin(self.0 / rhs)
    }
}

impl fmt::Display for Spin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°/s", self.to_degrees_per_second())
    }
}

/// Mass in kilograms
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Mass(f64);

impl Mass {
    #[inline]
    pub const fn kilograms(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn to_kilograms(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Mass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}kg", self.0)
    }
}

/// Density in kilograms per cubic metre
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Density(f64);

impl Density {
    #[inline]
    pub const fn kilograms_per_cubic_meter(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn kilograms_per_liter(value: f64) -> Self {
        Self(value * 1000.0)
    }

    #[inline]
    pub fn to_kilograms_per_cubic_meter(self) -> f64 {
        self.0
    }

    /// Mass of a ball with the given radius
    pub fn ball_mass(self, radius: Distance) -> Mass {
        let r = radius.to_meters();
        Mass(4.0 / 3.0 * std::f64::consts::PI * r * r * r * self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_conversions() {
        assert_eq!(Distance::meters(1.5).raw(), 1_500_000);
        assert_eq!(Distance::millimeters(0.2).raw(), 200);
        assert_eq!(Distance::millimeters(-3.0), -Distance::millimeters(3.0));
        assert!((Distance::meters(9000.0).to_meters() - 9000.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_arithmetic_is_exact_far_from_origin() {
        let far = Distance::meters(9000.0);
        let step = Distance::from_micros(7);
        assert_eq!((far + step) - far, step);
        assert_eq!(Distance::from_micros(7) / 2, Distance::from_micros(3));
        assert_eq!(Distance::from_micros(-7) / 2, Distance::from_micros(-3));
    }

    #[test]
    #[should_panic(expected = "distance overflow")]
    fn test_distance_overflow_panics() {
        let _ = Distance::from_micros(i64::MAX) + Distance::from_micros(1);
    }

    #[test]
    #[should_panic]
    fn test_non_finite_distance_panics() {
        let _ = Distance::from_meters(f64::NAN);
    }

    #[test]
    fn test_checked_distance_arithmetic() {
        assert_eq!(Distance::from_micros(i64::MAX).checked_add(Distance::from_micros(1)), None);
        assert_eq!(
            Distance::from_micros(3).checked_sub(Distance::from_micros(5)),
            Some(Distance::from_micros(-2))
        );
    }

    #[test]
    fn test_angle_wraps() {
        let almost_full = Angle::from_degrees(350.0);
        let wrapped = almost_full + Angle::from_degrees(20.0);
        assert!((wrapped.to_degrees() - 10.0).abs() < 1e-6);
        assert!((Angle::from_degrees(-90.0).to_degrees() + 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_angle_lerp_takes_short_path() {
        let from = Angle::from_degrees(170.0);
        let to = Angle::from_degrees(-170.0);
        let halfway = from.lerp(to, 0.5);
        assert!((halfway.to_degrees().abs() - 180.0).abs() < 1e-6);

        let quarter = Angle::from_degrees(10.0).lerp(Angle::from_degrees(50.0), 0.25);
        assert!((quarter.to_degrees() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_ball_mass() {
        let mass = Density::kilograms_per_liter(1.0).ball_mass(Distance::millimeters(100.0));
        let expected = 4.0 / 3.0 * std::f64::consts::PI * 0.001 * 1000.0;
        assert!((mass.to_kilograms() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_spin_surface_speed() {
        let spin = Spin::radians_per_second(10.0);
        assert!((spin.surface_speed(Distance::millimeters(100.0)) - 1.0).abs() < 1e-12);
        assert!((Spin::degrees_per_second(180.0).to_radians_per_second() - std::f64::consts::PI).abs() < 1e-12);
    }
}
