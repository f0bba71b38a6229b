//! Simulation configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) yields a runnable simulation.

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;
use crate::simulation::types::{Bounds, RadioParameters};

pub const MIN_NODE_COUNT: usize = 1;
pub const MAX_NODE_COUNT: usize = 500;
pub const MAX_SPEED: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SimulationConfig {
    /// Number of nodes created on init and on every reset.
    pub node_count: usize,
    /// Multiplier applied to the raw tick delta for mobility.
    pub speed: f64,
    pub world_width: f64,
    pub world_height: f64,
    /// Distance from each wall at which nodes bounce.
    pub margin: f64,
    /// Meters represented by one world unit in the propagation model.
    pub meters_per_unit: f64,
    /// Wall-clock interval between self-initiated beacons (ms). Not scaled by `speed`.
    pub broadcast_interval_ms: u64,
    /// Frame period of the runner's tick loop (ms).
    pub frame_interval_ms: u64,
    /// Seed for reproducible node placement; entropy when absent.
    pub seed: Option<u64>,
    pub radio: RadioParameters,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            node_count: 20,
            speed: 1.0,
            world_width: 768.0,
            world_height: 600.0,
            margin: 20.0,
            meters_per_unit: 10.0,
            broadcast_interval_ms: 1000,
            frame_interval_ms: 16,
            seed: None,
            radio: RadioParameters::default(),
        }
    }
}

pub fn validate_node_count(count: usize) -> Result<(), ConfigError> {
    if !(MIN_NODE_COUNT..=MAX_NODE_COUNT).contains(&count) {
        return Err(ConfigError::InvalidNodeCount {
            count,
            min: MIN_NODE_COUNT,
            max: MAX_NODE_COUNT,
        });
    }
    Ok(())
}

pub fn validate_speed(speed: f64) -> Result<(), ConfigError> {
    if !speed.is_finite() || speed <= 0.0 || speed > MAX_SPEED {
        return Err(ConfigError::InvalidSpeed(speed, MAX_SPEED));
    }
    Ok(())
}

impl SimulationConfig {
    /// Load configuration from a TOML file.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(config_path).map_err(|e| ConfigError::FileRead(e.to_string()))?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make the simulation meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_node_count(self.node_count)?;
        validate_speed(self.speed)?;

        let world_ok = self.world_width.is_finite()
            && self.world_height.is_finite()
            && self.margin.is_finite()
            && self.margin >= 0.0
            && self.world_width > 2.0 * self.margin
            && self.world_height > 2.0 * self.margin;
        if !world_ok {
            return Err(ConfigError::InvalidWorld {
                width: self.world_width,
                height: self.world_height,
                margin: self.margin,
            });
        }

        if !self.meters_per_unit.is_finite() || self.meters_per_unit <= 0.0 {
            return Err(ConfigError::InvalidScale(self.meters_per_unit));
        }
        if self.broadcast_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval { name: "broadcast-interval-ms" });
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval { name: "frame-interval-ms" });
        }

        let radio = &self.radio;
        if !radio.frequency_mhz.is_finite() || radio.frequency_mhz <= 0.0 {
            return Err(ConfigError::InvalidRadio(format!("frequency {} MHz must be positive", radio.frequency_mhz)));
        }
        if !radio.transmit_power_dbm.is_finite() || !radio.sensitivity_dbm.is_finite() {
            return Err(ConfigError::InvalidRadio("power levels must be finite".to_string()));
        }
        Ok(())
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            width: self.world_width,
            height: self.world_height,
            margin: self.margin,
        }
    }
}
