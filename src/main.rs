use anyhow::Context;
use embassy_executor::{Executor, Spawner};
use env_logger::Builder;
use log::{LevelFilter, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use manet_flood_simulator::config::SimulationConfig;
use manet_flood_simulator::control::{CONSOLE_HELP, ConsoleInput, SimulationEvent};
use manet_flood_simulator::simulation::log_capture::{TeeLogger, drain_captured_logs, init_log_capture};
use manet_flood_simulator::simulation::simulation_task;
use manet_flood_simulator::{CommandChannel, CommandChannelReceiver, CommandChannelSender, EventChannel, EventChannelReceiver, EventChannelSender};

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const TICK_SUMMARY_INTERVAL: Duration = Duration::from_secs(1);

fn embassy_init(spawner: Spawner, config: SimulationConfig, event_tx: EventChannelSender, command_rx: CommandChannelReceiver) {
    let _ = spawner.spawn(simulation_task(config, event_tx, command_rx));
}

fn init_logging() -> anyhow::Result<()> {
    let inner = Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("manet_flood_simulator"), LevelFilter::Debug)
        // Per-message router lines go to the capture buffer; see the `log` command.
        .filter(Some("manet_flood_simulator::simulation::router"), LevelFilter::Info)
        .parse_default_env()
        .build();

    let tee = TeeLogger::new(inner);
    init_log_capture();
    log::set_max_level(tee.filter());
    log::set_boxed_logger(Box::new(tee)).context("failed to install logger")?;
    Ok(())
}

/// Read console lines and forward them as commands until `quit` or EOF.
fn console_loop(command_tx: CommandChannelSender, running: Arc<AtomicBool>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ConsoleInput>() {
            Ok(ConsoleInput::Command(command)) => {
                if command_tx.try_send(command).is_err() {
                    warn!("Command queue full, command dropped");
                }
            }
            Ok(ConsoleInput::ShowLog) => {
                let entries = drain_captured_logs();
                if entries.is_empty() {
                    println!("no protocol events captured");
                }
                for entry in entries {
                    println!("{}", entry);
                }
            }
            Ok(ConsoleInput::Help) => println!("{}", CONSOLE_HELP),
            Ok(ConsoleInput::Quit) => break,
            Err(err) => println!("{} (type 'help' for commands)", err),
        }
    }
    running.store(false, Ordering::SeqCst);
}

fn print_event(event: SimulationEvent, last_summary: &mut Option<Instant>) {
    match event {
        SimulationEvent::Alert(message) => warn!("{}", message),
        SimulationEvent::StateChanged(state) => info!("Simulation state: {:?}", state),
        SimulationEvent::MessageSent(id) => info!("Message {} injected", id),
        SimulationEvent::Ticked(report) => {
            if last_summary.is_none_or(|at| at.elapsed() >= TICK_SUMMARY_INTERVAL) {
                *last_summary = Some(Instant::now());
                println!(
                    "tick {:>6}  links {:>4}  messages {:>6}  beacons {:>3}  forwards {:>4}",
                    report.tick, report.active_connections, report.message_count, report.beacons, report.forwards_drained
                );
            }
        }
        SimulationEvent::Snapshot(snapshot) => match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{}", json),
            Err(err) => warn!("Failed to serialize snapshot: {}", err),
        },
    }
}

fn main() -> anyhow::Result<()> {
    init_logging()?;

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => SimulationConfig::load(&path).with_context(|| format!("loading config from {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    config.validate().context("invalid configuration")?;

    info!("Starting up with {} nodes", config.node_count);

    let event_channel: &'static EventChannel = Box::leak(Box::new(EventChannel::new()));
    let command_channel: &'static CommandChannel = Box::leak(Box::new(CommandChannel::new()));

    let event_tx = event_channel.sender();
    let event_rx: EventChannelReceiver = event_channel.receiver();
    let command_tx = command_channel.sender();
    let command_rx = command_channel.receiver();

    // Spawn Embassy executor on a dedicated background thread
    thread::Builder::new()
        .stack_size(16 * 1024 * 1024)
        .name("embassy-executor".to_string())
        .spawn(move || {
            // Leak the executor to satisfy the 'static lifetime required by run()
            let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
            executor.run(|spawner| embassy_init(spawner, config, event_tx, command_rx));
        })
        .context("failed to spawn embassy thread")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        thread::Builder::new()
            .name("console".to_string())
            .spawn(move || console_loop(command_tx, running))
            .context("failed to spawn console thread")?;
    }

    println!("{}", CONSOLE_HELP);

    let mut last_summary = None;
    while running.load(Ordering::SeqCst) {
        while let Ok(event) = event_rx.try_receive() {
            print_event(event, &mut last_summary);
        }
        thread::sleep(EVENT_POLL_INTERVAL);
    }

    info!("Shutting down");
    Ok(())
}
