//! Error types.
//!
//! Configuration errors are fatal to constructing a simulation. Simulation
//! errors abort a single tick; the simulation pauses and keeps the error for
//! the caller. Protocol events (duplicates, unreachable destinations) are
//! never errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("node count {count} outside allowed range {min}..={max}")]
    InvalidNodeCount { count: usize, min: usize, max: usize },

    #[error("speed multiplier {0} must be finite, positive and at most {1}")]
    InvalidSpeed(f64, f64),

    #[error("world {width}x{height} with margin {margin} leaves no room for nodes")]
    InvalidWorld { width: f64, height: f64, margin: f64 },

    #[error("meters per world unit must be finite and positive, got {0}")]
    InvalidScale(f64),

    #[error("{name} must be positive")]
    InvalidInterval { name: &'static str },

    #[error("invalid radio parameters: {0}")]
    InvalidRadio(String),

    #[error("failed to read config file: {0}")]
    FileRead(String),

    #[error("failed to parse config file: {0}")]
    Parse(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("tick delta {0} must be finite and non-negative")]
    InvalidDelta(f64),

    #[error("node {node_id} position became non-finite ({x}, {y})")]
    NonFinitePosition { node_id: u32, x: f64, y: f64 },

    #[error("node {0} does not exist")]
    UnknownNode(u32),

    #[error("node {0} cannot address a message to itself")]
    SelfAddressed(u32),
}
