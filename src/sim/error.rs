//! Error types for the simulation

use thiserror::Error;

use super::EntityId;
use crate::units::Distance;

/// Internal invariant violations of the movement solver
///
/// These indicate a defect in the solver rather than bad input, so the tick
/// that produced them is aborted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("safety clamp did not converge: target is {actual} away but only {safe} is safe")]
    SafetyClampDiverged { actual: Distance, safe: Distance },

    #[error("contact points are {separation} apart but the contact radius is only {radius}")]
    InvalidIntersection { separation: Distance, radius: Distance },

    #[error("contact normal has squared length {length_squared}")]
    InvalidContactNormal { length_squared: f64 },
}

/// Errors reported by the scene API
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("can't find entity with id {0}")]
    UnknownEntity(EntityId),

    #[error("solver failure while moving entity {entity}: {source}")]
    Solver {
        entity: EntityId,
        #[source]
        source: SolverError,
    },
}

/// Errors while loading a scene configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid scene configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
