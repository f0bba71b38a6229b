//! Simulation task driving the tick loop from a frame timer and commands.
//!
//! Each loop iteration `select`s between the next command and the frame
//! timer, so commands are always applied between ticks and observers only
//! ever see settled state.

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};

use super::network::NetworkSimulation;
use crate::config::SimulationConfig;
use crate::control::{SimulationCommand, SimulationEvent};
use crate::{CommandChannelReceiver, EventChannelSender};

/// Apply one command and return the events to publish.
pub fn apply_command(simulation: &mut NetworkSimulation, command: SimulationCommand, now: Instant) -> Vec<SimulationEvent> {
    let state_before = simulation.state();
    let mut events = Vec::new();

    match command {
        SimulationCommand::Start => simulation.start(),
        SimulationCommand::Pause => simulation.pause(),
        SimulationCommand::Resume => simulation.resume(),
        SimulationCommand::TogglePause => simulation.toggle_pause(),
        SimulationCommand::Reset => {
            simulation.reset(now);
            events.push(SimulationEvent::Snapshot(simulation.snapshot()));
        }
        SimulationCommand::SetNodeCount(count) => match simulation.set_node_count(count, now) {
            Ok(()) if !simulation.is_running() => events.push(SimulationEvent::Snapshot(simulation.snapshot())),
            Ok(()) => {}
            Err(err) => events.push(SimulationEvent::Alert(format!("Cannot change node count: {}", err))),
        },
        SimulationCommand::SetSpeed(speed) => {
            if let Err(err) = simulation.set_speed(speed) {
                events.push(SimulationEvent::Alert(format!("Cannot change speed: {}", err)));
            }
        }
        SimulationCommand::SendMessage { from, to } => match simulation.send_message(from, to, now) {
            Ok(id) => events.push(SimulationEvent::MessageSent(id)),
            Err(err) => events.push(SimulationEvent::Alert(format!("Cannot send message: {}", err))),
        },
        SimulationCommand::RequestSnapshot => events.push(SimulationEvent::Snapshot(simulation.snapshot())),
    }

    if simulation.state() != state_before {
        events.insert(0, SimulationEvent::StateChanged(simulation.state()));
    }
    events
}

/// Run one frame: tick with the elapsed wall time and report the outcome.
pub fn run_frame(simulation: &mut NetworkSimulation, raw_delta: Duration, now: Instant) -> Vec<SimulationEvent> {
    let raw_delta_secs = raw_delta.as_micros() as f64 / 1_000_000.0;
    match simulation.tick(raw_delta_secs, now) {
        Ok(Some(report)) => vec![SimulationEvent::Ticked(report)],
        Ok(None) => Vec::new(),
        Err(err) => vec![
            SimulationEvent::Alert(format!("Simulation paused after error: {}", err)),
            SimulationEvent::StateChanged(simulation.state()),
        ],
    }
}

/// Central simulation task.
///
/// Builds the simulation from `config` (reporting configuration errors as an
/// alert), then loops: commands are applied as they arrive, and every frame
/// interval the simulation ticks with the real elapsed time. Tick reports are
/// published with `try_send`; a slow observer misses reports, not commands.
#[embassy_executor::task]
pub async fn simulation_task(config: SimulationConfig, event_tx: EventChannelSender, command_rx: CommandChannelReceiver) {
    let mut simulation = match NetworkSimulation::new(config, Instant::now()) {
        Ok(simulation) => simulation,
        Err(err) => {
            event_tx.send(SimulationEvent::Alert(format!("Invalid configuration: {}", err))).await;
            return;
        }
    };
    let frame_interval = Duration::from_millis(simulation.config().frame_interval_ms);

    event_tx.send(SimulationEvent::StateChanged(simulation.state())).await;
    event_tx.send(SimulationEvent::Snapshot(simulation.snapshot())).await;

    let mut last_frame = Instant::now();
    loop {
        match select(command_rx.receive(), Timer::after(frame_interval)).await {
            Either::First(command) => {
                let was_running = simulation.is_running();
                for event in apply_command(&mut simulation, command, Instant::now()) {
                    event_tx.send(event).await;
                }
                // Time spent stopped is not simulated.
                if !was_running && simulation.is_running() {
                    last_frame = Instant::now();
                }
            }
            Either::Second(()) => {
                let now = Instant::now();
                let raw_delta = now.saturating_duration_since(last_frame);
                last_frame = now;
                for event in run_frame(&mut simulation, raw_delta, now) {
                    if event_tx.try_send(event).is_err() {
                        log::trace!("Event channel full, dropping tick report");
                    }
                }
            }
        }
    }
}
