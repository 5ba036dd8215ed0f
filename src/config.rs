//! Scene configuration
//!
//! Loaded from JSON or built in code; every field has a default, so a config
//! file only needs to mention what it changes.

use serde::{Deserialize, Serialize};

use crate::consts::{GRAVITY, WORLD_LIMIT};
use crate::sim::ConfigError;
use crate::units::Distance;

/// Tunable parameters of a [`Scene`](crate::Scene)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Downward gravitational acceleration (m/s²)
    pub gravity: f64,
    /// Entities further than this from the origin on either axis are destroyed (m)
    pub world_limit_m: f64,
    /// Upper bound on catch-up ticks per `update` call (`None` = unbounded)
    pub max_ticks_per_update: Option<u32>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            world_limit_m: WORLD_LIMIT.to_meters(),
            max_ticks_per_update: None,
        }
    }
}

impl SceneConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SceneConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gravity.is_finite() || self.gravity < 0.0 {
            return Err(ConfigError::Invalid {
                field: "gravity",
                reason: format!("{} is not a finite, non-negative acceleration", self.gravity),
            });
        }
        // Beyond ~9.2e12 m the fixed-point coordinates overflow
        if !self.world_limit_m.is_finite() || self.world_limit_m <= 0.0 || self.world_limit_m > 1e9 {
            return Err(ConfigError::Invalid {
                field: "world_limit_m",
                reason: format!("{} is not in (0, 1e9]", self.world_limit_m),
            });
        }
        if self.max_ticks_per_update == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_ticks_per_update",
                reason: "must allow at least one tick".to_string(),
            });
        }
        Ok(())
    }

    pub fn world_limit(&self) -> Distance {
        Distance::from_meters(self.world_limit_m)
    }
}
