//! Reusable scenes for the demo runner and the regression tests
//!
//! Builders queue requests, which are realized by the next
//! [`Scene::update`]. The returned handles belong to the entities a caller
//! is most likely to follow.

use std::time::Duration;

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::geometry::{LineSegment, Offset, Position};
use crate::sim::{EntityId, EntitySpawnRequest, RequestHandle, Scene, SimError, TilePlaceRequest};
use crate::units::Distance;

fn add_tiles(scene: &Scene, tiles: impl IntoIterator<Item = LineSegment>) {
    for tile in tiles {
        scene.add_tile(TilePlaceRequest::new(tile));
    }
}

/// Two balls dropped on either side of the apex of a roof made of two 45°
/// ramps, each 10 m wide
pub fn split_ramps(scene: &Scene) -> Vec<RequestHandle<EntityId>> {
    let length = 10.0;
    add_tiles(
        scene,
        [
            LineSegment::meters(0.0, 0.0, -length, -length),
            LineSegment::meters(0.0, 0.0, length, -length),
        ],
    );

    let radius = Distance::millimeters(100.0);
    vec![
        scene.spawn_entity(EntitySpawnRequest::new(Position::meters(-0.25, 1.5), radius)),
        scene.spawn_entity(EntitySpawnRequest::new(Position::meters(0.25, 1.5), radius)),
    ]
}

/// A zigzag parkour of pipes that get narrower on the way down, next to
/// the same parkour without pipes
///
/// The pipes leave `margin` of clearance for a ball of `radius`, from 5 mm
/// at the top down to nothing at the bottom. The returned handles are the
/// ball in the pipes and the ball on the open slopes.
pub fn narrow_pipes(scene: &Scene, radius: Distance) -> Vec<RequestHandle<EntityId>> {
    let diameter = (radius * 2).to_meters();
    let length = DVec2::new(2.0, 0.5);
    let normal = length.perp() / length.length();

    let right_to_left_pipe = |base_y: f64, margin_mm: f64| {
        let lift = normal * (diameter + margin_mm / 1000.0);
        [
            LineSegment::meters(-0.5, base_y, length.x, length.y),
            LineSegment::meters(-0.5 + lift.x, base_y + lift.y, length.x / 2.0, length.y / 2.0),
        ]
    };
    let left_to_right_pipe = |base_y: f64, margin_mm: f64| {
        let lift = normal * (diameter + margin_mm / 1000.0);
        [
            LineSegment::meters(1.2, base_y, -length.x, length.y),
            LineSegment::meters(1.2 - lift.x, base_y + lift.y, -length.x / 2.0, length.y / 2.0),
        ]
    };
    let right_to_left_slope = |base_y: f64| LineSegment::meters(1.8, base_y, length.x, length.y);
    let left_to_right_slope = |base_y: f64| LineSegment::meters(3.5, base_y, -length.x, length.y);

    add_tiles(
        scene,
        [
            LineSegment::meters(-0.8, -13.0, 0.0, 18.0),
            LineSegment::meters(1.5, -13.0, 0.0, 18.0),
            LineSegment::meters(3.8, -13.0, 0.0, 18.0),
            LineSegment::meters(-0.8, -13.0, 4.6, 0.0),
        ],
    );

    // (height of the right-to-left pipe, its margin, margin of the pipe below it)
    let levels = [
        (4.0, 5.0, 4.0),
        (2.0, 3.0, 2.0),
        (0.0, 1.0, 0.5),
        (-2.0, 0.25, 0.13),
        (-4.0, 0.07, 0.06),
        (-6.0, 0.05, 0.04),
        (-8.0, 0.03, 0.02),
        (-10.0, 0.01, 0.0),
    ];
    for (base_y, upper_margin, lower_margin) in levels {
        add_tiles(scene, right_to_left_pipe(base_y, upper_margin));
        add_tiles(scene, left_to_right_pipe(base_y - 1.0, lower_margin));
        add_tiles(scene, [right_to_left_slope(base_y), left_to_right_slope(base_y - 1.0)]);
    }

    vec![
        scene.spawn_entity(EntitySpawnRequest::new(Position::meters(1.0, 5.0), radius)),
        scene.spawn_entity(EntitySpawnRequest::new(Position::meters(3.3, 5.0), radius)),
    ]
}

/// A big ball catching up with a small ball on a flat floor
///
/// The two once stuck together after colliding. Returns the small ball,
/// then the big ball.
pub fn sticky_balls(scene: &Scene) -> Vec<RequestHandle<EntityId>> {
    let small = scene.spawn_entity(
        EntitySpawnRequest::new(Position::meters(1.5, 1.521), Distance::millimeters(20.0))
            .with_velocity(DVec2::new(0.5, 0.0)),
    );
    let big = scene.spawn_entity(
        EntitySpawnRequest::new(Position::meters(0.0, 1.601), Distance::millimeters(100.0))
            .with_velocity(DVec2::new(4.0, 0.0)),
    );
    add_tiles(scene, [LineSegment::meters(-10.0, 1.5, 30.0, 0.0)]);
    vec![small, big]
}

/// A floor between two slanted walls with a heavy and a tiny ball on it,
/// for testing impulses between very different masses
///
/// Returns the player ball, the heavy ball and the tiny ball.
pub fn impulse_test(scene: &Scene) -> Vec<RequestHandle<EntityId>> {
    let length = 3.0;
    add_tiles(
        scene,
        [
            LineSegment::meters(-length, 0.0, 2.0 * length, 0.0),
            LineSegment::meters(-length, 0.0, -length / 2.0, length),
            LineSegment::meters(length, 0.0, length / 2.0, length),
        ],
    );

    vec![
        scene.spawn_entity(EntitySpawnRequest::new(Position::meters(0.0, 1.5), Distance::millimeters(100.0))),
        scene.spawn_entity(EntitySpawnRequest::new(Position::meters(length / 2.0, 2.0), Distance::meters(1.0))),
        scene.spawn_entity(EntitySpawnRequest::new(
            Position::meters(-length / 2.0, 2.0),
            Distance::millimeters(20.0),
        )),
    ]
}

/// Many random tiles and entities in a 200 m box, for load testing
///
/// The same `seed` always produces the same requests in the same order, so
/// the resulting scene is reproducible. The tiles are realized right away so
/// that entities overlapping them get rejected.
pub fn random_busy(
    scene: &Scene,
    seed: u64,
    tile_count: usize,
    entity_count: usize,
) -> Result<Vec<RequestHandle<EntityId>>, SimError> {
    let mut rng = Pcg32::seed_from_u64(seed);

    for _ in 0..tile_count {
        scene.add_tile(TilePlaceRequest::new(LineSegment::new(
            Position::millimeters(
                rng.random_range(-100_000..100_000) as f64,
                rng.random_range(-100_000..100_000) as f64,
            ),
            Offset::new(
                Distance::millimeters(rng.random_range(100..1_000) as f64),
                Distance::millimeters(rng.random_range(100..1_000) as f64),
            ),
        )));
    }
    add_tiles(
        scene,
        [
            LineSegment::meters(-100.0, -100.0, 200.0, 0.0),
            LineSegment::meters(-100.0, -100.0, 0.0, 200.0),
            LineSegment::meters(-100.0, 100.0, 200.0, 0.0),
            LineSegment::meters(100.0, -100.0, 0.0, 200.0),
        ],
    );
    scene.update(Duration::ZERO)?;

    let handles = (0..entity_count)
        .map(|_| {
            let position = Position::millimeters(
                rng.random_range(-10_000..10_000) as f64,
                rng.random_range(-10_000..10_000) as f64,
            );
            let radius = Distance::millimeters(rng.random_range(20..300) as f64);
            scene.spawn_entity(EntitySpawnRequest::new(position, radius))
        })
        .collect();
    Ok(handles)
}
