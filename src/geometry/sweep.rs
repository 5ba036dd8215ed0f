//! Swept-circle tests for continuous collision detection
//!
//! Both sweeps report the position of the moving circle at first contact.
//! Contact positions are placed `CONTACT_SKIN` beyond touching distance so
//! that rounding them to the fixed-point grid can never produce overlap. A
//! path that never comes within `TOUCH_TOLERANCE` of touching is a miss.

use glam::DVec2;

use super::{LineSegment, Offset, Position, distance_point_to_segment, distance_segment_to_segment};
use crate::consts::{CONTACT_SKIN, TOUCH_TOLERANCE};
use crate::units::Distance;

/// Slack for travel fractions that overshoot [0, 1] by rounding alone
const FRACTION_SLACK: f64 = 1e-9;

/// Outcome of sweeping a circle against a line segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepResult {
    /// The swept circle touches the segment; `circle` is the center of the
    /// circle at first contact and `segment` the touched point of the segment
    Hit { circle: Position, segment: Position },
    /// The circle can travel the whole delta without touching the segment
    Miss,
    /// The configuration is too degenerate for a reliable answer; retry with
    /// a shorter delta
    Dirty,
}

/// Sweep a circle from `start` along `delta` against `segment`
pub fn sweep_circle_to_segment(
    start: Position,
    delta: Offset,
    radius: Distance,
    segment: &LineSegment,
) -> SweepResult {
    let path = LineSegment::new(start, delta);
    let (closest_approach, _, _) = distance_segment_to_segment(&path, segment);
    if closest_approach >= radius + TOUCH_TOLERANCE {
        return SweepResult::Miss;
    }

    let contact_distance = (radius + CONTACT_SKIN).to_meters();
    let d = delta.to_meters();

    let (start_distance, start_closest) = distance_point_to_segment(start, segment);
    if start_distance <= radius + CONTACT_SKIN {
        // Distance along a straight path is convex: when it does not shrink
        // right away, the closest approach is the start itself
        let towards = start.offset_to(start_closest).to_meters();
        if d.dot(towards) <= 0.0 {
            return SweepResult::Miss;
        }
        if start_distance <= radius {
            return SweepResult::Dirty;
        }
        return SweepResult::Hit {
            circle: start,
            segment: start_closest,
        };
    }

    let s = start.offset_to(segment.start).to_meters();
    let l = segment.length.to_meters();

    let mut first: Option<f64> = None;
    let mut consider = |t: f64| {
        if (-FRACTION_SLACK..=1.0 + FRACTION_SLACK).contains(&t) {
            let t = t.clamp(0.0, 1.0);
            if first.is_none_or(|best| t < best) {
                first = Some(t);
            }
        }
    };

    // Contact with the interior of the segment
    let length_squared = l.length_squared();
    if length_squared > 0.0 {
        let normal = l.perp() / length_squared.sqrt();
        let height = -s.dot(normal);
        let approach = d.dot(normal);
        if height != 0.0 && approach * height < 0.0 {
            let t = (contact_distance.copysign(height) - height) / approach;
            let center = d * t;
            let along = (center - s).dot(l) / length_squared;
            if (0.0..=1.0).contains(&along) {
                consider(t);
            }
        }
    }

    // Contact with either endpoint
    if let Some(t) = first_contact_with_point(d, s, contact_distance) {
        consider(t);
    }
    if length_squared > 0.0 {
        if let Some(t) = first_contact_with_point(d, s + l, contact_distance) {
            consider(t);
        }
    }

    let Some(t) = first else {
        return SweepResult::Dirty;
    };

    let circle = start.displaced(d * t);
    let (distance, on_segment) = distance_point_to_segment(circle, segment);
    if distance <= radius {
        return SweepResult::Dirty;
    }

    SweepResult::Hit {
        circle,
        segment: on_segment,
    }
}

/// Smallest travel fraction at which a point moving along `delta` from the
/// origin comes within `contact_distance` of `target`
fn first_contact_with_point(delta: DVec2, target: DVec2, contact_distance: f64) -> Option<f64> {
    let a = delta.length_squared();
    if a == 0.0 {
        return None;
    }
    let b = -2.0 * delta.dot(target);
    let c = target.length_squared() - contact_distance * contact_distance;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    Some((-b - discriminant.sqrt()) / (2.0 * a))
}

/// Sweep circle `a` along `delta_a` against the stationary circle `b`
///
/// Returns the center of `a` at first contact, or `None` when the circles do
/// not touch during the sweep or are already separating.
pub fn sweep_circle_to_circle(
    position_a: Position,
    radius_a: Distance,
    delta_a: Offset,
    position_b: Position,
    radius_b: Distance,
) -> Option<Position> {
    let combined = radius_a + radius_b;
    let e = position_a.offset_to(position_b).to_meters();
    let d = delta_a.to_meters();

    let speed_squared = d.length_squared();
    let closest_fraction = if speed_squared > 0.0 {
        (d.dot(e) / speed_squared).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest_approach = (d * closest_fraction - e).length();
    if closest_approach >= (combined + TOUCH_TOLERANCE).to_meters() {
        return None;
    }

    let contact_distance = (combined + CONTACT_SKIN).to_meters();
    if e.length() <= contact_distance {
        if d.dot(e) > 0.0 {
            return Some(position_a);
        }
        return None;
    }

    let a = speed_squared;
    let b = -2.0 * d.dot(e);
    let c = e.length_squared() - contact_distance * contact_distance;
    let discriminant = (b * b - 4.0 * a * c).max(0.0);
    let t = ((-b - discriminant.sqrt()) / (2.0 * a)).clamp(0.0, 1.0);

    Some(position_a.displaced(d * t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_point_near(expected: Position, actual: Position, threshold: Distance) {
        assert!(
            (expected.x - actual.x).abs() <= threshold && (expected.y - actual.y).abs() <= threshold,
            "expected {expected:?}, got {actual:?}"
        );
    }

    fn mm(value: f64) -> Distance {
        Distance::millimeters(value)
    }

    #[test]
    fn test_sweep_onto_floor() {
        let floor = LineSegment::meters(-10.0, 0.0, 20.0, 0.0);
        let start = Position::meters(0.0, 1.0);
        let radius = Distance::meters(0.1);

        let result = sweep_circle_to_segment(start, Offset::meters(0.0, -2.0), radius, &floor);
        let SweepResult::Hit { circle, segment } = result else {
            panic!("expected a hit, got {result:?}");
        };
        assert_eq!(circle.x, Distance::ZERO);
        assert_eq!(circle.y, radius + CONTACT_SKIN);
        assert_eq!(segment, Position::ORIGIN);

        assert_eq!(
            sweep_circle_to_segment(start, Offset::meters(0.0, -0.5), radius, &floor),
            SweepResult::Miss
        );
    }

    #[test]
    fn test_overlapping_start_depends_on_direction() {
        let floor = LineSegment::meters(-10.0, 0.0, 20.0, 0.0);
        let radius = Distance::meters(0.1);
        let start = Position::new(Distance::ZERO, radius - mm(1.0));

        assert_eq!(
            sweep_circle_to_segment(start, Offset::meters(0.0, -0.1), radius, &floor),
            SweepResult::Dirty
        );
        assert_eq!(
            sweep_circle_to_segment(start, Offset::meters(0.05, -0.01), radius, &floor),
            SweepResult::Dirty
        );
        assert_eq!(
            sweep_circle_to_segment(start, Offset::meters(0.0, 0.1), radius, &floor),
            SweepResult::Miss
        );
        // Sliding along the floor never gets deeper
        assert_eq!(
            sweep_circle_to_segment(start, Offset::meters(0.1, 0.0), radius, &floor),
            SweepResult::Miss
        );
    }

    #[test]
    fn test_sweep_past_segment_end() {
        let post = LineSegment::meters(0.0, 0.0, 0.0, 1.0);
        let radius = Distance::meters(0.1);

        // Passes over the top with room to spare
        let over = sweep_circle_to_segment(Position::meters(-1.0, 1.2), Offset::meters(2.0, 0.0), radius, &post);
        assert_eq!(over, SweepResult::Miss);

        // Clips the top endpoint
        let clip = sweep_circle_to_segment(Position::meters(-1.0, 1.05), Offset::meters(2.0, 0.0), radius, &post);
        let SweepResult::Hit { circle, segment } = clip else {
            panic!("expected a hit, got {clip:?}");
        };
        assert_eq!(segment, Position::meters(0.0, 1.0));
        let touching = circle.distance(segment);
        assert!(touching > radius && touching <= radius + CONTACT_SKIN + Distance::from_micros(1));
        assert!(circle.x < Distance::ZERO);
    }

    #[test]
    fn test_sweep_sliding_contact_is_not_a_hit() {
        let floor = LineSegment::meters(-10.0, 0.0, 20.0, 0.0);
        let radius = Distance::meters(0.1);
        let resting = Position::new(Distance::ZERO, radius + CONTACT_SKIN);

        let sliding = sweep_circle_to_segment(resting, Offset::meters(0.05, 0.0), radius, &floor);
        assert_eq!(sliding, SweepResult::Miss);

        let leaving = sweep_circle_to_segment(resting, Offset::meters(0.05, 0.01), radius, &floor);
        assert_eq!(leaving, SweepResult::Miss);

        let pressing = sweep_circle_to_segment(resting, Offset::meters(0.05, -0.001), radius, &floor);
        assert_eq!(
            pressing,
            SweepResult::Hit {
                circle: resting,
                segment: Position::ORIGIN
            }
        );
    }

    #[test]
    fn test_sweep_against_point_segment() {
        let point = LineSegment::meters(1.0, 0.0, 0.0, 0.0);
        let result = sweep_circle_to_segment(
            Position::ORIGIN,
            Offset::meters(2.0, 0.0),
            Distance::meters(0.5),
            &point,
        );
        let SweepResult::Hit { circle, segment } = result else {
            panic!("expected a hit, got {result:?}");
        };
        assert_point_near(Position::meters(0.5, 0.0), circle, Distance::from_micros(3));
        assert_eq!(segment, Position::meters(1.0, 0.0));
    }

    #[test]
    fn test_sweep_circle_to_segment_regression() {
        let segment = LineSegment::new(Position::millimeters(7000.0, 0.0), Offset::meters(1.0, 4.0));
        let result = sweep_circle_to_segment(
            Position::millimeters(6939.53, 115.06),
            Offset::new(mm(238.74), mm(2.88)),
            mm(46.0),
            &segment,
        );
        let SweepResult::Hit { circle, .. } = result else {
            panic!("expected a hit, got {result:?}");
        };
        assert_point_near(Position::millimeters(6980.0, 115.0), circle, mm(30.0));

        let start = Position::meters(-6.397, 1.27852);
        let delta = Offset::meters(-1.43524, 2.18087);
        let result = sweep_circle_to_segment(
            start,
            delta,
            mm(20.0),
            &LineSegment::meters(-65.174, -25.146, 78.468, 39.172),
        );
        let SweepResult::Hit { circle, .. } = result else {
            panic!("expected a hit, got {result:?}");
        };
        assert_point_near(start.displaced(delta.to_meters() * 0.99925), circle, mm(0.1));
    }

    #[test]
    fn test_sweep_circle_to_circle_regression() {
        let hit = |ax: f64, ay: f64, ar: f64, dx: f64, dy: f64, bx: f64, by: f64, br: f64| {
            sweep_circle_to_circle(
                Position::meters(ax, ay),
                Distance::meters(ar),
                Offset::meters(dx, dy),
                Position::meters(bx, by),
                Distance::meters(br),
            )
        };

        let point = hit(100.0, 100.0, 1.0, 10.0, 0.0, 108.0, 104.0, 4.0);
        assert_point_near(Position::meters(105.0, 100.0), point.unwrap(), mm(0.2));

        let point = hit(96.0, 100.0, 1.0, 10.0, 0.0, 108.0, 104.0, 4.0);
        assert_point_near(Position::meters(105.0, 100.0), point.unwrap(), mm(0.2));

        assert_eq!(hit(112.0, 100.0, 1.0, 10.0, 0.0, 108.0, 104.0, 4.0), None);
        assert_eq!(hit(115.0, 100.0, 1.0, 10.0, 0.0, 108.0, 104.0, 4.0), None);

        assert!(hit(0.79, 0.1011, 0.1, 0.03, -0.001, 1.0, 0.1, 0.1).is_some());
        assert!(hit(5.92579, 0.10908, 0.109, -0.00191, 0.00051, 5.65642, 0.32833, 0.213).is_none());
        assert!(hit(0.0, -9.41707, 0.1, 0.00046, 0.00003, 0.00003, -9.01706, 0.3).is_some());

        let point = hit(-0.2999, -9.41719, 0.2, 0.05, -0.15004, 0.0, -9.7171, 0.2).unwrap();
        let gap = point.distance(Position::meters(0.0, -9.7171));
        assert!((gap - mm(400.0)).abs() <= mm(0.1));

        assert!(hit(-3.96452, -5.89396, 0.1, 0.00003, -0.00003, -2.67293, -7.04412, 0.2).is_none());

        let point = hit(0.0, -9.41709, 0.1, 0.00073, 0.00001, 0.0001, -9.01708, 0.30001).unwrap();
        let gap = point.distance(Position::meters(0.00001, -9.01708));
        assert!((gap - mm(400.0)).abs() <= mm(0.1));

        let point = hit(0.33735, -8.03748, 0.1, 0.01167, -0.00595, 0.21327, -8.31096, 0.20001).unwrap();
        let gap = point.distance(Position::meters(0.21327, -8.31096));
        assert!((gap - mm(300.0)).abs() <= mm(0.1));

        let point = hit(-4.69896, -12.73651, 0.26, -0.01686, -0.00296, -4.63889, -13.17675, 0.184).unwrap();
        let gap = point.distance(Position::meters(-4.63889, -13.17675));
        assert!((gap - mm(444.0)).abs() <= mm(0.1));
    }

    #[test]
    fn test_separating_circles_do_not_hit() {
        let a = Position::ORIGIN;
        let b = Position::meters(0.2 + 0.000_001, 0.0);
        let radius = Distance::meters(0.1);
        assert_eq!(sweep_circle_to_circle(a, radius, Offset::meters(-0.01, 0.0), b, radius), None);
        assert_eq!(sweep_circle_to_circle(a, radius, Offset::meters(0.0, 0.01), b, radius), None);
        assert_eq!(sweep_circle_to_circle(a, radius, Offset::meters(0.01, 0.0), b, radius), Some(a));
    }
}
