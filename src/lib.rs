//! Mobile ad-hoc radio network simulator.
//!
//! Nodes wander a bounded world, link up whenever the free-space link budget
//! allows, and flood beacons and injected messages hop by hop with duplicate
//! suppression. The simulation runs as an embassy task; front ends talk to it
//! through the command and event channels declared here.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

pub mod config;
pub mod control;
pub mod error;
pub mod simulation;

use control::{SimulationCommand, SimulationEvent};

pub const COMMAND_CHANNEL_SIZE: usize = 100;
pub type CommandChannel = embassy_sync::channel::Channel<CriticalSectionRawMutex, SimulationCommand, COMMAND_CHANNEL_SIZE>;
pub type CommandChannelReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SimulationCommand, COMMAND_CHANNEL_SIZE>;
pub type CommandChannelSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SimulationCommand, COMMAND_CHANNEL_SIZE>;

pub const EVENT_CHANNEL_SIZE: usize = 100;
pub type EventChannel = embassy_sync::channel::Channel<CriticalSectionRawMutex, SimulationEvent, EVENT_CHANNEL_SIZE>;
pub type EventChannelReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, SimulationEvent, EVENT_CHANNEL_SIZE>;
pub type EventChannelSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, SimulationEvent, EVENT_CHANNEL_SIZE>;
