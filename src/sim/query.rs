//! Snapshots of a scene region for rendering
//!
//! A [`SceneQuery`] holds copies of the tiles and entities in a box, taken
//! under the scene lock by [`Scene::read`]. The snapshot keeps each entity's
//! transform before and after the last tick, so the renderer can place it at
//! any point in time between (or shortly after) ticks without touching the
//! scene again.

use std::collections::HashMap;
use std::time::Instant;

use glam::DVec2;
use serde::Serialize;

use super::entity::{Entity, EntityId, EntitySpawnRequest};
use super::error::SimError;
use super::material::Material;
use super::scene::{RequestHandle, Scene};
use super::tile::{Tile, TilePlaceRequest};
use crate::config::SceneConfig;
use crate::consts::{STEP_DURATION, STEP_SECONDS};
use crate::geometry::{Aabb, Position};
use crate::units::{Angle, Distance, Spin};

/// Copy of one entity as of the last tick
///
/// `position` and `angle` start out as the committed transform; the
/// interpolation methods of [`SceneQuery`] overwrite them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub radius: Distance,
    pub material: Material,
    pub position: Position,
    pub velocity: DVec2,
    pub angle: Angle,
    pub spin: Spin,

    #[serde(skip)]
    old_position: Position,
    #[serde(skip)]
    current_position: Position,
    #[serde(skip)]
    old_angle: Angle,
    #[serde(skip)]
    current_angle: Angle,
}

impl EntitySnapshot {
    pub(crate) fn capture(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            radius: entity.radius,
            material: entity.material,
            position: entity.position,
            velocity: entity.velocity,
            angle: entity.angle,
            spin: entity.spin,
            old_position: entity.old_position,
            current_position: entity.position,
            old_angle: entity.old_angle,
            current_angle: entity.angle,
        }
    }

    /// Place the entity at `progress` steps after its previous transform
    ///
    /// 0 is the transform before the last tick, 1 the committed one; larger
    /// values continue the last tick's motion linearly.
    fn blend(&mut self, progress: f64) {
        self.position = self.old_position.lerp(self.current_position, progress);
        self.angle = self.old_angle.lerp(self.current_angle, progress);
    }
}

/// Reusable output buffers for [`Scene::read`]
#[derive(Debug, Default)]
pub struct SceneQuery {
    tiles: Vec<Tile>,
    entities: Vec<EntitySnapshot>,

    /// Scene generation and bounds of the last read
    cache_key: Option<(u64, Aabb)>,
    last_modified: Option<Instant>,
    gravity: f64,
}

impl SceneQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn entities(&self) -> &[EntitySnapshot] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    /// Bounds of the last read
    pub fn bounds(&self) -> Option<Aabb> {
        self.cache_key.map(|(_, bounds)| bounds)
    }

    /// Time at which the scene finished the tick this snapshot shows
    pub fn last_modified(&self) -> Option<Instant> {
        self.last_modified
    }

    pub(crate) fn is_current(&self, generation: u64, bounds: Aabb) -> bool {
        self.cache_key == Some((generation, bounds))
    }

    pub(crate) fn fill(
        &mut self,
        generation: u64,
        last_modified: Instant,
        bounds: Aabb,
        gravity: f64,
        tiles: impl Iterator<Item = Tile>,
        entities: impl Iterator<Item = EntitySnapshot>,
    ) {
        self.cache_key = Some((generation, bounds));
        self.last_modified = Some(last_modified);
        self.gravity = gravity;

        self.tiles.clear();
        self.tiles.extend(tiles);
        self.entities.clear();
        self.entities.extend(entities);
    }

    /// Steps elapsed between the last tick and `render_time`
    fn steps_since_update(&self, render_time: Instant) -> f64 {
        match self.last_modified {
            Some(last_modified) => render_time.saturating_duration_since(last_modified).as_secs_f64() / STEP_SECONDS,
            None => 0.0,
        }
    }

    fn blend_all(&mut self, progress: f64) {
        for entity in &mut self.entities {
            entity.blend(progress);
        }
    }

    /// Blend between the previous and the committed transform
    ///
    /// Shows the world up to one step in the past, but never guesses.
    pub fn interpolate(&mut self, render_time: Instant) {
        let progress = self.steps_since_update(render_time).clamp(0.0, 1.0);
        self.blend_all(progress);
    }

    /// Continue the last tick's motion for up to one more step
    pub fn extrapolate_simple(&mut self, render_time: Instant) {
        self.extrapolate_simple_with_limit(render_time, 1.0);
    }

    /// Continue the last tick's motion for up to `max_steps` more steps
    pub fn extrapolate_simple_with_limit(&mut self, render_time: Instant, max_steps: f64) {
        let progress = 1.0 + self.steps_since_update(render_time).min(max_steps);
        self.blend_all(progress);
    }

    /// Extrapolate by simulating the next step in a throwaway scene
    ///
    /// Unlike [`SceneQuery::extrapolate_simple`] this respects collisions
    /// with the tiles and entities of the snapshot. Entities the throwaway
    /// scene can not take over fall back to simple extrapolation.
    pub fn extrapolate_accurately(&mut self, render_time: Instant) -> Result<(), SimError> {
        let Some(bounds) = self.bounds() else {
            return Ok(());
        };
        let progress = self.steps_since_update(render_time).clamp(0.0, 1.0);

        let mini_scene = Scene::from_validated(SceneConfig {
            gravity: self.gravity,
            ..SceneConfig::default()
        });
        for tile in &self.tiles {
            mini_scene.add_tile(TilePlaceRequest::new(tile.collider).with_material(tile.material));
        }
        let handles: Vec<RequestHandle<EntityId>> = self
            .entities
            .iter()
            .map(|entity| {
                mini_scene.spawn_entity(
                    EntitySpawnRequest::new(entity.current_position, entity.radius)
                        .with_material(entity.material)
                        .with_velocity(entity.velocity)
                        .with_angle(entity.current_angle)
                        .with_spin(entity.spin),
                )
            })
            .collect();

        mini_scene.update(STEP_DURATION)?;
        let mut mini_query = SceneQuery::new();
        mini_scene.read(&mut mini_query, bounds);
        mini_query.blend_all(progress);

        let predicted: HashMap<EntityId, &EntitySnapshot> =
            mini_query.entities.iter().map(|entity| (entity.id, entity)).collect();

        for (entity, handle) in self.entities.iter_mut().zip(&handles) {
            match handle.id().and_then(|id| predicted.get(&id)) {
                Some(prediction) => {
                    entity.position = prediction.position;
                    entity.angle = prediction.angle;
                }
                None => entity.blend(1.0 + progress),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LineSegment;
    use crate::units::Density;
    use std::time::Duration;

    const SPEED: f64 = 10.0;

    fn prepare_simple() -> SceneQuery {
        let scene = Scene::new();
        scene.spawn_entity(
            EntitySpawnRequest::new(Position::meters(100.0, 0.0), Distance::meters(1.0))
                .with_velocity(DVec2::new(SPEED, 0.0)),
        );
        scene.update(STEP_DURATION).unwrap();

        let mut query = SceneQuery::new();
        scene.read(
            &mut query,
            Aabb::new(Position::meters(100.0, -1.0), Position::meters(110.0, 1.0)),
        );
        assert_eq!(query.entities().len(), 1);
        assert_eq!(query.entities()[0].position.x, Distance::meters(100.0 + SPEED * STEP_SECONDS));
        query
    }

    fn render_time(query: &SceneQuery, steps: f64) -> Instant {
        query.last_modified().unwrap() + STEP_DURATION.mul_f64(steps)
    }

    fn assert_x_near(query: &SceneQuery, expected_m: f64) {
        let actual = query.entities()[0].position.x.to_millimeters();
        let expected = expected_m * 1000.0;
        assert!((actual - expected).abs() <= 1.0, "expected {expected} mm, got {actual} mm");
    }

    #[test]
    fn test_interpolate() {
        let mut query = prepare_simple();
        let at = render_time(&query, 0.75);
        query.interpolate(at);
        assert_x_near(&query, 100.0 + 0.75 * SPEED * STEP_SECONDS);
    }

    #[test]
    fn test_interpolate_clamps_progress() {
        let mut query = prepare_simple();
        let at = render_time(&query, 5.0);
        query.interpolate(at);
        assert_x_near(&query, 100.0 + SPEED * STEP_SECONDS);

        // Before the tick finished
        let early = query.last_modified().unwrap() - Duration::from_millis(3);
        query.interpolate(early);
        assert_x_near(&query, 100.0);
    }

    #[test]
    fn test_extrapolate_simple() {
        let mut query = prepare_simple();
        let at = render_time(&query, 0.75);
        query.extrapolate_simple(at);
        assert_x_near(&query, 100.0 + 1.75 * SPEED * STEP_SECONDS);
    }

    #[test]
    fn test_extrapolate_simple_with_limit() {
        let mut query = prepare_simple();
        let at = render_time(&query, 10.0);
        query.extrapolate_simple(at);
        assert_x_near(&query, 100.0 + 2.0 * SPEED * STEP_SECONDS);

        query.extrapolate_simple_with_limit(at, 3.0);
        assert_x_near(&query, 100.0 + 4.0 * SPEED * STEP_SECONDS);
    }

    #[test]
    fn test_extrapolate_accurately_with_simple_case() {
        let mut query = prepare_simple();
        let at = render_time(&query, 0.75);
        query.extrapolate_accurately(at).unwrap();
        assert_x_near(&query, 100.0 + 1.75 * SPEED * STEP_SECONDS);
    }

    #[test]
    fn test_extrapolate_accurately_against_wall() {
        let speed = 100.0;
        let material = Material::new(Density::kilograms_per_liter(10.0));
        let scene = Scene::new();
        scene.spawn_entity(
            EntitySpawnRequest::new(Position::meters(10.0, 0.0), Distance::meters(1.0))
                .with_velocity(DVec2::new(speed, 0.0))
                .with_material(material),
        );
        scene.add_tile(
            TilePlaceRequest::new(LineSegment::meters(11.1 + speed * STEP_SECONDS, -10.0, 0.0, 20.0))
                .with_material(material),
        );
        scene.update(STEP_DURATION).unwrap();

        let mut query = SceneQuery::new();
        scene.read(
            &mut query,
            Aabb::new(Position::meters(10.0, -1.0), Position::meters(20.0, 1.0)),
        );
        assert_eq!(query.entities().len(), 1);
        assert!((query.entities()[0].position.x.to_meters() - 11.0).abs() < 0.001);

        let at = render_time(&query, 1.0);
        query.extrapolate_accurately(at).unwrap();
        assert!((query.entities()[0].position.x.to_meters() - 11.1).abs() < 0.001);
    }

    #[test]
    fn test_angle_interpolation_takes_short_way() {
        let scene = Scene::with_config(SceneConfig {
            gravity: 0.0,
            ..SceneConfig::default()
        })
        .unwrap();
        // 170° + 20° lands at -170°
        scene.spawn_entity(
            EntitySpawnRequest::new(Position::ORIGIN, Distance::meters(0.1))
                .with_angle(Angle::from_degrees(170.0))
                .with_spin(Spin::degrees_per_second(2000.0)),
        );
        scene.update(STEP_DURATION).unwrap();

        let mut query = SceneQuery::new();
        scene.read(&mut query, Aabb::around(Position::ORIGIN, Distance::meters(1.0)));
        let at = render_time(&query, 0.5);
        query.interpolate(at);
        let degrees = query.entities()[0].angle.to_degrees();
        assert!((degrees - 180.0).abs() < 0.01 || (degrees + 180.0).abs() < 0.01, "angle is {degrees}");
    }

    #[test]
    fn test_read_is_cached() {
        let scene = Scene::new();
        scene.spawn_entity(
            EntitySpawnRequest::new(Position::ORIGIN, Distance::meters(0.1)).with_velocity(DVec2::new(1.0, 0.0)),
        );
        scene.update(STEP_DURATION).unwrap();

        let bounds = Aabb::around(Position::ORIGIN, Distance::meters(1.0));
        let mut query = SceneQuery::new();
        scene.read(&mut query, bounds);
        let at = render_time(&query, 2.0);
        query.extrapolate_simple(at);
        let extrapolated = query.entities()[0];
        assert_ne!(extrapolated.position, extrapolated.current_position);

        // Unchanged scene and bounds: the blended snapshot is kept as is
        scene.read(&mut query, bounds);
        assert_eq!(query.entities()[0], extrapolated);

        scene.update(STEP_DURATION).unwrap();
        scene.read(&mut query, bounds);
        assert_eq!(query.entities()[0].position, query.entities()[0].current_position);
    }
}
