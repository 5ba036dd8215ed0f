//! Surface and bulk properties shared by entities and tiles

use serde::{Deserialize, Serialize};

use crate::units::{Density, Distance, Mass};

/// Physical material of an entity or tile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub density: Density,
    /// Extra rebound on impact (0 = no bounce)
    pub bounce_factor: f64,
    /// Scales rolling friction on contact
    pub friction_factor: f64,
}

impl Material {
    pub const IRON: Material = Material::new(Density::kilograms_per_liter(7.9));

    pub const fn new(density: Density) -> Self {
        Self {
            density,
            bounce_factor: 0.0,
            friction_factor: 1.0,
        }
    }

    pub const fn with_bounce(mut self, bounce_factor: f64) -> Self {
        self.bounce_factor = bounce_factor;
        self
    }

    pub const fn with_friction(mut self, friction_factor: f64) -> Self {
        self.friction_factor = friction_factor;
        self
    }

    /// Mass of a ball of this material
    pub fn ball_mass(&self, radius: Distance) -> Mass {
        self.density.ball_mass(radius)
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::IRON
    }
}
