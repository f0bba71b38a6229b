//! Command and event type definitions for the control module.

use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

use crate::simulation::network::{SimulationSnapshot, SimulationState, TickReport};
use crate::simulation::types::MessageId;

/// Commands accepted by the simulation task.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationCommand {
    Start,
    Pause,
    Resume,
    /// Pause when running, resume when paused.
    TogglePause,
    Reset,
    SetNodeCount(usize),
    SetSpeed(f64),
    /// Inject a message at `from`; `to == None` floods it.
    SendMessage { from: u32, to: Option<u32> },
    RequestSnapshot,
}

/// Events published by the simulation task to observers.
#[derive(Debug, Clone, Serialize)]
pub enum SimulationEvent {
    Alert(String),
    StateChanged(SimulationState),
    Ticked(TickReport),
    MessageSent(MessageId),
    Snapshot(SimulationSnapshot),
}

/// A console line: either a simulation command or a console-local action.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Command(SimulationCommand),
    ShowLog,
    Help,
    Quit,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{command}' expects {expected}")]
    MissingArgument { command: &'static str, expected: &'static str },
    #[error("invalid argument '{0}'")]
    InvalidArgument(String),
}

fn parse_arg<T: FromStr>(arg: Option<&str>, command: &'static str, expected: &'static str) -> Result<T, CommandParseError> {
    let arg = arg.ok_or(CommandParseError::MissingArgument { command, expected })?;
    arg.parse().map_err(|_| CommandParseError::InvalidArgument(arg.to_string()))
}

impl FromStr for ConsoleInput {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(CommandParseError::Empty)?;

        let input = match command.to_ascii_lowercase().as_str() {
            "start" => ConsoleInput::Command(SimulationCommand::Start),
            "pause" => ConsoleInput::Command(SimulationCommand::Pause),
            "resume" => ConsoleInput::Command(SimulationCommand::Resume),
            "toggle" => ConsoleInput::Command(SimulationCommand::TogglePause),
            "reset" => ConsoleInput::Command(SimulationCommand::Reset),
            "nodes" => ConsoleInput::Command(SimulationCommand::SetNodeCount(parse_arg(words.next(), "nodes", "a node count")?)),
            "speed" => ConsoleInput::Command(SimulationCommand::SetSpeed(parse_arg(words.next(), "speed", "a multiplier")?)),
            "send" => {
                let from = parse_arg(words.next(), "send", "a sender node id")?;
                let to = match words.next() {
                    Some(arg) => Some(arg.parse().map_err(|_| CommandParseError::InvalidArgument(arg.to_string()))?),
                    None => None,
                };
                ConsoleInput::Command(SimulationCommand::SendMessage { from, to })
            }
            "snapshot" => ConsoleInput::Command(SimulationCommand::RequestSnapshot),
            "log" => ConsoleInput::ShowLog,
            "help" => ConsoleInput::Help,
            "quit" | "exit" => ConsoleInput::Quit,
            other => return Err(CommandParseError::Unknown(other.to_string())),
        };
        Ok(input)
    }
}

pub const CONSOLE_HELP: &str = "\
commands:
  start | pause | resume | toggle | reset
  nodes <count>        change node count (applies now unless running)
  speed <multiplier>   change mobility speed multiplier
  send <from> [to]     inject a message, flooded when no destination
  snapshot             print the current state as JSON
  log                  show recent protocol events
  quit";

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> SimulationCommand {
        match line.parse::<ConsoleInput>() {
            Ok(ConsoleInput::Command(cmd)) => cmd,
            other => panic!("'{}' parsed as {:?}", line, other),
        }
    }

    #[test]
    fn parses_lifecycle_commands() {
        assert_eq!(command("start"), SimulationCommand::Start);
        assert_eq!(command("  PAUSE "), SimulationCommand::Pause);
        assert_eq!(command("toggle"), SimulationCommand::TogglePause);
        assert_eq!(command("reset"), SimulationCommand::Reset);
    }

    #[test]
    fn parses_parameters() {
        assert_eq!(command("nodes 40"), SimulationCommand::SetNodeCount(40));
        assert_eq!(command("speed 2.5"), SimulationCommand::SetSpeed(2.5));
        assert_eq!(command("send 3"), SimulationCommand::SendMessage { from: 3, to: None });
        assert_eq!(command("send 3 9"), SimulationCommand::SendMessage { from: 3, to: Some(9) });
    }

    #[test]
    fn console_local_actions() {
        assert_eq!("log".parse::<ConsoleInput>(), Ok(ConsoleInput::ShowLog));
        assert_eq!("exit".parse::<ConsoleInput>(), Ok(ConsoleInput::Quit));
        assert_eq!("help".parse::<ConsoleInput>(), Ok(ConsoleInput::Help));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!("".parse::<ConsoleInput>(), Err(CommandParseError::Empty));
        assert_eq!("fly".parse::<ConsoleInput>(), Err(CommandParseError::Unknown("fly".into())));
        assert!(matches!("nodes".parse::<ConsoleInput>(), Err(CommandParseError::MissingArgument { .. })));
        assert_eq!("speed fast".parse::<ConsoleInput>(), Err(CommandParseError::InvalidArgument("fast".into())));
        assert_eq!("send 1 x".parse::<ConsoleInput>(), Err(CommandParseError::InvalidArgument("x".into())));
    }
}
