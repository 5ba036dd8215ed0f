//! balls2d - deterministic 2D rigid-circle physics
//!
//! Core modules:
//! - `units`: Fixed-point and physical quantity types
//! - `geometry`: Distance and sweep primitives for circles and line segments
//! - `sim`: Scene, solver, broad-phase indices and snapshot queries
//! - `config`: Data-driven scene configuration
//! - `scenarios`: Reusable test and demo scenes

pub mod config;
pub mod geometry;
pub mod scenarios;
pub mod sim;
pub mod units;

pub use config::SceneConfig;
pub use geometry::{LineSegment, Offset, Position};
pub use sim::{
    EntityController, EntityId, EntitySnapshot, EntitySpawnRequest, KinematicState, Material,
    RequestHandle, Scene, SceneQuery, SimError, SolverError, Tile, TileId, TilePlaceRequest,
};
pub use units::{Angle, Density, Distance, Mass, Spin};

/// Simulation configuration constants
pub mod consts {
    use std::time::Duration;

    use crate::units::Distance;

    /// Fixed simulation timestep (100 Hz)
    pub const STEP_DURATION: Duration = Duration::from_millis(10);
    /// Fixed simulation timestep in seconds
    pub const STEP_SECONDS: f64 = 0.01;

    /// Default gravitational acceleration (m/s², pointing down)
    pub const GRAVITY: f64 = 9.8;

    /// Entities beyond this coordinate are destroyed; also bounds the tile index
    pub const WORLD_LIMIT: Distance = Distance::from_micros(10_000_000_000);

    /// Cell size of the entity clustering grid
    pub const CLUSTER_CELL_SIZE: Distance = Distance::from_micros(1_000_000);

    /// Sweeps place contact points this far beyond touching distance
    pub const CONTACT_SKIN: Distance = Distance::from_micros(2);
    /// A swept path that stays at least this far beyond touching distance is a miss
    pub const TOUCH_TOLERANCE: Distance = Distance::from_micros(1);

    /// Intersections within this arc length of the nearest one are simultaneous
    pub const SIMULTANEOUS_CONTACT_TOLERANCE: Distance = Distance::from_micros(1_000);
    /// Extra margin added to the safe radius
    pub const SAFE_RADIUS_MARGIN: Distance = Distance::from_micros(1_000);
    /// Safe radius scale factor
    pub const SAFE_RADIUS_FACTOR: f64 = 1.1;
    /// Retry steps are skipped when the remaining delta is shorter than this
    pub const MIN_RETRY_DELTA: Distance = Distance::from_micros(100);
    /// Separation applied by the anti-stall margin nudge
    pub const MARGIN_DISTANCE: Distance = Distance::from_micros(200);
    /// Maximum number of retry steps after the first resolve
    pub const MAX_RETRY_STEPS: u32 = 2;
    /// Maximum number of dirty-sweep passes per collision search
    pub const MAX_SWEEP_PASSES: u32 = 8;

    /// Maximum change of spin caused by rolling friction (rad/s²)
    pub const MAX_ANGULAR_ACCELERATION: f64 = 4000.0 * std::f64::consts::PI / 180.0;
    /// Contact normals are forgotten after this long without contact
    pub const NORMAL_MEMORY: Duration = Duration::from_millis(100);
}

/// Convert a duration into a number of whole steps plus the leftover
#[inline]
pub fn split_steps(elapsed: std::time::Duration) -> (u64, std::time::Duration) {
    let step = consts::STEP_DURATION.as_nanos();
    let nanos = elapsed.as_nanos();
    let steps = (nanos / step) as u64;
    let rest = (nanos % step) as u64;
    (steps, std::time::Duration::from_nanos(rest))
}
