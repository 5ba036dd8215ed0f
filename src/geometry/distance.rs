//! Point and segment distance queries

use glam::DVec2;

use super::{LineSegment, Position};
use crate::units::Distance;

/// Segments whose cross product is smaller than this (relative to the product
/// of their lengths) are treated as parallel
const PARALLEL_EPSILON: f64 = 1e-12;

/// Closest point of `segment`, relative to `point`, in metres
fn closest_relative(point: Position, segment: &LineSegment) -> DVec2 {
    let start = point.offset_to(segment.start).to_meters();
    let length = segment.length.to_meters();
    let length_squared = length.length_squared();
    if length_squared == 0.0 {
        return start;
    }

    let t = (-start.dot(length) / length_squared).clamp(0.0, 1.0);
    start + length * t
}

/// Point of `segment` that is closest to `point`
pub fn closest_point_on_segment(point: Position, segment: &LineSegment) -> Position {
    point.displaced(closest_relative(point, segment))
}

/// Distance between a point and a segment, plus the closest point on the segment
///
/// Zero-length segments are treated as a point.
pub fn distance_point_to_segment(point: Position, segment: &LineSegment) -> (Distance, Position) {
    let closest = closest_relative(point, segment);
    (Distance::from_meters(closest.length()), point.displaced(closest))
}

/// Distance between two segments, plus the closest point on each of them
///
/// The result does not depend on the argument order: `(d, pa, pb)` for `(a, b)`
/// becomes `(d, pb, pa)` for `(b, a)`. When the segments touch or cross, both
/// points are the same.
pub fn distance_segment_to_segment(a: &LineSegment, b: &LineSegment) -> (Distance, Position, Position) {
    if segment_key(b) < segment_key(a) {
        let (distance, on_b, on_a) = ordered_segment_distance(b, a);
        (distance, on_a, on_b)
    } else {
        ordered_segment_distance(a, b)
    }
}

fn segment_key(segment: &LineSegment) -> (Distance, Distance, Distance, Distance) {
    let end = segment.end();
    (segment.start.x, segment.start.y, end.x, end.y)
}

fn ordered_segment_distance(a: &LineSegment, b: &LineSegment) -> (Distance, Position, Position) {
    let origin = a.start;
    let u = a.length.to_meters();
    let q = origin.offset_to(b.start).to_meters();
    let v = b.length.to_meters();

    let denominator = u.perp_dot(v);
    if denominator.abs() > PARALLEL_EPSILON * u.length() * v.length() {
        let t = q.perp_dot(v) / denominator;
        let s = q.perp_dot(u) / denominator;
        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&s) {
            let crossing = origin.displaced(u * t);
            return (Distance::ZERO, crossing, crossing);
        }
    }

    // Without a crossing, the closest pair always involves an endpoint
    let candidates = [
        (a.start, closest_relative(a.start, b), false),
        (a.end(), closest_relative(a.end(), b), false),
        (b.start, closest_relative(b.start, a), true),
        (b.end(), closest_relative(b.end(), a), true),
    ];

    let mut best = &candidates[0];
    for candidate in &candidates[1..] {
        if candidate.1.length_squared() < best.1.length_squared() {
            best = candidate;
        }
    }

    let (endpoint, relative, endpoint_on_b) = *best;
    let distance = Distance::from_meters(relative.length());
    let closest = if distance == Distance::ZERO {
        endpoint
    } else {
        endpoint.displaced(relative)
    };

    if endpoint_on_b {
        (distance, closest, endpoint)
    } else {
        (distance, endpoint, closest)
    }
}
