//! Deterministic simulation module
//!
//! Everything that changes the world lives here. Given the same requests in
//! the same order, a scene produces bit-identical results:
//! - Fixed timestep only
//! - Fixed-point positions, geometry relative to the moving entity
//! - Stable iteration order (by spawn order)

mod clustering;
pub mod constraint;
pub mod entity;
pub mod error;
pub mod material;
mod movement;
pub mod query;
pub mod scene;
pub mod tile;

pub use constraint::{MaxAccelerationConstraint, NotMovingConstraint, SlidingWindow, VelocityConstraint};
pub use entity::{ContactNormal, EntityController, EntityId, EntitySpawnRequest, KinematicState, NormalTracker};
pub use error::{ConfigError, SimError, SolverError};
pub use material::Material;
pub use movement::ColliderId;
pub use query::{EntitySnapshot, SceneQuery};
pub use scene::{RequestHandle, Scene};
pub use tile::{Tile, TileId, TilePlaceRequest, TileTree};
