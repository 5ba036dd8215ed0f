//! Scene: owns the world and advances it in fixed steps
//!
//! Spawn and placement requests are queued through channels, so producers
//! never wait for the simulation. Everything else (ticking and reading)
//! serializes on one coarse lock around the world.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;

use super::clustering::EntityClustering;
use super::entity::{Entity, EntityId, EntitySpawnRequest};
use super::error::{ConfigError, SimError};
use super::movement::EntityMovement;
use super::query::{EntitySnapshot, SceneQuery};
use super::tile::{Tile, TileId, TilePlaceRequest, TileTree};
use crate::config::SceneConfig;
use crate::consts::STEP_DURATION;
use crate::geometry::{Aabb, LineSegment, Position, distance_point_to_segment};
use crate::split_steps;
use crate::units::Distance;

/// Shared view on the outcome of a queued request
///
/// The handle becomes processed during the next [`Scene::update`]. A
/// processed request without an id was rejected because it would overlap
/// existing entities or tiles.
pub struct RequestHandle<Id> {
    outcome: Arc<OnceLock<Option<Id>>>,
}

impl<Id: Copy> RequestHandle<Id> {
    fn new() -> Self {
        Self {
            outcome: Arc::new(OnceLock::new()),
        }
    }

    pub fn is_processed(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Id of the realized request, if it was accepted
    pub fn id(&self) -> Option<Id> {
        self.outcome.get().copied().flatten()
    }

    fn complete(&self, id: Option<Id>) {
        // A request is drained exactly once
        let _ = self.outcome.set(id);
    }
}

impl<Id> Clone for RequestHandle<Id> {
    fn clone(&self) -> Self {
        Self {
            outcome: Arc::clone(&self.outcome),
        }
    }
}

impl<Id: fmt::Debug> fmt::Debug for RequestHandle<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle").field("outcome", &self.outcome.get()).finish()
    }
}

/// Everything guarded by the scene lock
struct World {
    tiles: TileTree,
    entities: Vec<Entity>,
    clustering: EntityClustering,
    movement: EntityMovement,

    spawn_requests: Receiver<(EntitySpawnRequest, RequestHandle<EntityId>)>,
    tile_requests: Receiver<(TilePlaceRequest, RequestHandle<TileId>)>,
    next_entity_id: u64,
    next_tile_id: u64,

    world_limit: Distance,
    gravity: f64,
    max_ticks_per_update: Option<u32>,

    remaining_time: Duration,
    tick_count: u64,
    /// Bumped whenever anything a query could observe changes
    generation: u64,
    last_update: Instant,

    query_tiles: Vec<u32>,
    tree_work: Vec<u32>,
}

impl World {
    fn can_spawn(&mut self, position: Position, radius: Distance) -> bool {
        let safe_box = Aabb::around(position, radius * 2);
        self.query_tiles.clear();
        self.tiles.query(&safe_box, &mut self.query_tiles, &mut self.tree_work);
        for &index in &self.query_tiles {
            let (distance, _) = distance_point_to_segment(position, &self.tiles.tile(index).collider);
            if distance <= radius {
                return false;
            }
        }

        self.entities.iter().all(|entity| {
            let combined = (radius + entity.radius).to_meters();
            entity.position.offset_to(position).to_meters().length_squared() > combined * combined
        })
    }

    fn can_place(&self, collider: &LineSegment) -> bool {
        self.entities.iter().all(|entity| {
            let (distance, _) = distance_point_to_segment(entity.position, collider);
            distance > entity.radius
        })
    }

    fn process_requests(&mut self) {
        while let Ok((request, handle)) = self.spawn_requests.try_recv() {
            if self.can_spawn(request.position, request.radius) {
                self.next_entity_id += 1;
                let id = EntityId(self.next_entity_id);
                self.entities.push(Entity::spawn(id, request));
                self.generation += 1;
                handle.complete(Some(id));
            } else {
                debug!("rejected spawn of radius {} at {:?}: overlap", request.radius, request.position);
                handle.complete(None);
            }
        }

        while let Ok((request, handle)) = self.tile_requests.try_recv() {
            if self.can_place(&request.collider) {
                self.next_tile_id += 1;
                let id = TileId(self.next_tile_id);
                self.tiles.insert(Tile {
                    id,
                    collider: request.collider,
                    material: request.material,
                });
                self.generation += 1;
                handle.complete(Some(id));
            } else {
                debug!("rejected tile {:?}: overlaps an entity", request.collider);
                handle.complete(None);
            }
        }
    }

    fn tick(&mut self) -> Result<(), SimError> {
        for entity in &mut self.entities {
            entity.begin_tick();
        }
        for (index, entity) in self.entities.iter_mut().enumerate() {
            self.clustering
                .insert(index as u32, entity.wip_position, self.movement.safe_radius(entity));
            entity.run_constraints();
        }

        let result = self.update_entities();
        self.clustering.reset();
        result?;

        for entity in &mut self.entities {
            entity.commit_tick();
        }

        let limit = self.world_limit;
        self.entities.retain(|entity| {
            let inside = !entity.position.is_beyond(limit);
            if !inside {
                info!("destroyed {} at {:?}: left the world", entity.id, entity.position);
            }
            inside
        });

        self.tick_count += 1;
        self.generation += 1;
        self.last_update = Instant::now();
        Ok(())
    }

    fn update_entities(&mut self) -> Result<(), SimError> {
        for index in 0..self.entities.len() {
            self.movement
                .move_entity(&mut self.entities, index, &self.tiles, &mut self.clustering)
                .map_err(|source| SimError::Solver {
                    entity: self.entities[index].id,
                    source,
                })?;
            self.entities[index].run_controller();
        }
        Ok(())
    }

    fn read(&mut self, query: &mut SceneQuery, bounds: Aabb) {
        if query.is_current(self.generation, bounds) {
            return;
        }

        self.query_tiles.clear();
        self.tiles.query(&bounds, &mut self.query_tiles, &mut self.tree_work);
        let tiles = self.query_tiles.iter().map(|&index| *self.tiles.tile(index));

        let entities = self
            .entities
            .iter()
            .filter(|entity| Aabb::around(entity.position, entity.radius).intersects(&bounds))
            .map(EntitySnapshot::capture);

        query.fill(self.generation, self.last_update, bounds, self.gravity, tiles, entities);
    }
}

/// A simulated world of entities and tiles
///
/// `Scene` is `Send + Sync`: requests and reads may come from any thread,
/// while one thread drives [`Scene::update`].
pub struct Scene {
    config: SceneConfig,
    world: Mutex<World>,
    spawn_sender: Sender<(EntitySpawnRequest, RequestHandle<EntityId>)>,
    tile_sender: Sender<(TilePlaceRequest, RequestHandle<TileId>)>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::from_validated(SceneConfig::default())
    }

    /// Create an empty scene, rejecting configurations that fail
    /// [`SceneConfig::validate`]
    pub fn with_config(config: SceneConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    pub(crate) fn from_validated(config: SceneConfig) -> Self {
        let (spawn_sender, spawn_requests) = mpsc::channel();
        let (tile_sender, tile_requests) = mpsc::channel();
        let world_limit = config.world_limit();

        let world = World {
            tiles: TileTree::new(Aabb::around(Position::ORIGIN, world_limit)),
            entities: Vec::new(),
            clustering: EntityClustering::new(),
            movement: EntityMovement::new(config.gravity),
            spawn_requests,
            tile_requests,
            next_entity_id: 0,
            next_tile_id: 0,
            world_limit,
            gravity: config.gravity,
            max_ticks_per_update: config.max_ticks_per_update,
            remaining_time: Duration::ZERO,
            tick_count: 0,
            generation: 0,
            last_update: Instant::now(),
            query_tiles: Vec::new(),
            tree_work: Vec::new(),
        };

        Self {
            config,
            world: Mutex::new(world),
            spawn_sender,
            tile_sender,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Queue an entity; it is spawned (or rejected) during the next update
    pub fn spawn_entity(&self, request: EntitySpawnRequest) -> RequestHandle<EntityId> {
        let handle = RequestHandle::new();
        // The receiver lives as long as `self`
        let _ = self.spawn_sender.send((request, handle.clone()));
        handle
    }

    /// Queue a tile; it is placed (or rejected) during the next update
    pub fn add_tile(&self, request: TilePlaceRequest) -> RequestHandle<TileId> {
        let handle = RequestHandle::new();
        let _ = self.tile_sender.send((request, handle.clone()));
        handle
    }

    /// Process queued requests, then run as many whole steps as `elapsed`
    /// (plus the leftover of earlier calls) covers
    ///
    /// A solver failure aborts the running tick; the world keeps the state
    /// committed by the previous tick, and the time of the failed tick and
    /// every tick after it stays queued for the next update. Only the
    /// internal state of entity controllers that already ran is not rolled
    /// back.
    pub fn update(&self, elapsed: Duration) -> Result<(), SimError> {
        let mut world = self.world.lock();
        world.process_requests();

        let pending = world.remaining_time + elapsed;
        let (mut steps, rest) = split_steps(pending);
        world.remaining_time = pending;
        if let Some(cap) = world.max_ticks_per_update {
            if steps > u64::from(cap) {
                warn!("dropping {} ticks of backlog", steps - u64::from(cap));
                steps = u64::from(cap);
                world.remaining_time = rest + STEP_DURATION * cap;
            }
        }

        for _ in 0..steps {
            world.tick()?;
            world.remaining_time -= STEP_DURATION;
        }
        Ok(())
    }

    /// Copy everything overlapping `bounds` into `query`
    ///
    /// Nothing is copied when neither the scene nor `bounds` changed since the
    /// previous read into the same query.
    pub fn read(&self, query: &mut SceneQuery, bounds: Aabb) {
        self.world.lock().read(query, bounds);
    }

    /// Read a `view_width` × `view_height` box centered on entity `target`
    ///
    /// Returns the position of the target.
    pub fn read_target(
        &self,
        query: &mut SceneQuery,
        target: EntityId,
        view_width: Distance,
        view_height: Distance,
    ) -> Result<Position, SimError> {
        let mut world = self.world.lock();
        let position = world
            .entities
            .iter()
            .find(|entity| entity.id == target)
            .map(|entity| entity.position)
            .ok_or(SimError::UnknownEntity(target))?;

        let (half_width, half_height) = (view_width / 2, view_height / 2);
        let bounds = Aabb::new(
            Position::new(position.x - half_width, position.y - half_height),
            Position::new(position.x + half_width, position.y + half_height),
        );
        world.read(query, bounds);
        Ok(position)
    }

    pub fn entity_count(&self) -> usize {
        self.world.lock().entities.len()
    }

    pub fn tile_count(&self) -> usize {
        self.world.lock().tiles.len()
    }

    /// Number of steps simulated so far
    pub fn tick_count(&self) -> u64 {
        self.world.lock().tick_count
    }
}
