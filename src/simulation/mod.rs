//! Network simulation core module.
//!
//! This module provides the simulation of a mobile ad-hoc radio network:
//! - Free-space propagation and the connectivity verdict
//! - Node mobility with elastic reflection at the world margin
//! - Per-tick connectivity recomputation and the one-hop neighbor cache
//! - Flood routing with duplicate suppression
//! - The tick driver and lifecycle (start, pause, reset, parameters)
//!
//! ## Module Organization
//!
//! - `types`: Core data structures (nodes, messages, radio parameters)
//! - `signal_calculations`: Path loss, received power, link verdicts
//! - `geometry`: Distances and mobility
//! - `connectivity`: The per-tick connectivity graph
//! - `router`: Flood protocol (ingestion, dedup, draining, beacons)
//! - `network`: `NetworkSimulation`, the tick driver and snapshot source
//! - `log_capture`: Per-node capture of protocol log lines for observers
//! - `runner`: Embassy task driving the simulation from commands and a frame timer

pub mod connectivity;
pub mod geometry;
pub mod log_capture;
pub mod network;
pub mod router;
pub mod runner;
pub mod signal_calculations;
pub mod types;

// Re-export the main simulation task for convenience
pub use runner::simulation_task;

// Re-export commonly used types
pub use network::{NetworkSimulation, SimulationSnapshot, SimulationState};
pub use types::{MessageId, Point};
