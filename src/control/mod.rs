//! Control module: commands sent into the simulation task and the events it
//! publishes back, plus parsing of console command lines.

pub mod command;

pub use command::{CONSOLE_HELP, CommandParseError, ConsoleInput, SimulationCommand, SimulationEvent};
