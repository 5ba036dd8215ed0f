use super::{Circle, LineSegment, Position, distance_point_to_segment};
use crate::units::Distance;

/// Push `point` away from every nearby collider it is closer to than `margin`
///
/// A circle of `radius` at `point` that touches (or nearly touches) one of the
/// given entity circles or tile segments is moved along the contact normal so
/// that the gap becomes `margin`. Colliders are handled one after another, so
/// a later push may undo part of an earlier one. Returns whether `point` was
/// moved.
pub fn create_margin(
    point: &mut Position,
    radius: Distance,
    entities: &[Circle],
    tiles: &[LineSegment],
    margin: Distance,
) -> bool {
    let mut moved = false;

    for other in entities {
        let away = other.center.offset_to(*point).to_meters();
        let distance = away.length();
        let wanted = (radius + other.radius + margin).to_meters();
        if distance > 0.0 && distance < wanted {
            *point = point.displaced(away * (wanted / distance - 1.0));
            moved = true;
        }
    }

    for tile in tiles {
        let (_, closest) = distance_point_to_segment(*point, tile);
        let away = closest.offset_to(*point).to_meters();
        let distance = away.length();
        let wanted = (radius + margin).to_meters();
        if distance > 0.0 && distance < wanted {
            *point = point.displaced(away * (wanted / distance - 1.0));
            moved = true;
        }
    }

    moved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_from_floor() {
        let floor = LineSegment::meters(-5.0, 0.0, 10.0, 0.0);
        let radius = Distance::meters(0.1);
        let mut point = Position::new(Distance::meters(1.0), radius + Distance::from_micros(2));

        assert!(create_margin(&mut point, radius, &[], &[floor], Distance::millimeters(0.2)));
        assert_eq!(point.x, Distance::meters(1.0));
        assert_eq!(point.y, radius + Distance::millimeters(0.2));
    }

    #[test]
    fn test_margin_from_entity() {
        let radius = Distance::meters(0.1);
        let other = Circle::new(Position::ORIGIN, Distance::meters(0.2));
        let mut point = Position::meters(0.0, 0.3);

        assert!(create_margin(&mut point, radius, &[other], &[], Distance::millimeters(0.2)));
        assert_eq!(point, Position::new(Distance::ZERO, Distance::meters(0.3) + Distance::millimeters(0.2)));
    }

    #[test]
    fn test_no_margin_when_free() {
        let floor = LineSegment::meters(-5.0, 0.0, 10.0, 0.0);
        let other = Circle::new(Position::meters(3.0, 0.5), Distance::meters(0.2));
        let mut point = Position::meters(0.0, 0.5);
        let before = point;

        assert!(!create_margin(&mut point, Distance::meters(0.1), &[other], &[floor], Distance::millimeters(0.2)));
        assert_eq!(point, before);
    }
}
