//! Log capture for routing protocol events to observers.
//!
//! The flood router logs originations and deliveries with a `[node_id]`
//! prefix. `TeeLogger` forwards all records to the wrapped `env_logger` and,
//! once capture is initialized, additionally captures router records up to
//! debug into a bounded global buffer, which observers drain to show a
//! recent-event log. Per-hop trace records are never captured.
//!
//! For example: `[12] broadcasting 12-3`

use chrono::{DateTime, Local};
use log::{Level, Log, Metadata, Record};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Maximum number of captured entries kept; the oldest are dropped first.
pub const LOG_BUFFER_CAPACITY: usize = 100;

/// Module whose records are captured.
const CAPTURED_MODULE: &str = "manet_flood_simulator::simulation::router";

/// A captured log entry with extracted node ID.
#[derive(Debug, Clone)]
pub struct CapturedLogEntry {
    pub node_id: u32,
    pub timestamp: DateTime<Local>,
    pub content: String,
    pub level: Level,
}

impl std::fmt::Display for CapturedLogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] Node {}: {}", self.timestamp.format("%H:%M:%S"), self.node_id, self.content)
    }
}

/// Set by `init_log_capture`; until then router records are not formatted.
static CAPTURE_ENABLED: AtomicBool = AtomicBool::new(false);

/// Global buffer for captured log entries.
static CAPTURED_LOGS: Mutex<Option<VecDeque<CapturedLogEntry>>> = Mutex::new(None);

fn captured_logs() -> MutexGuard<'static, Option<VecDeque<CapturedLogEntry>>> {
    CAPTURED_LOGS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Initialize the log capture buffer. Until called, nothing is captured.
pub fn init_log_capture() {
    *captured_logs() = Some(VecDeque::with_capacity(LOG_BUFFER_CAPACITY));
    CAPTURE_ENABLED.store(true, Ordering::Release);
}

fn capture_enabled() -> bool {
    CAPTURE_ENABLED.load(Ordering::Acquire)
}

/// Drain all captured log entries from the buffer.
pub fn drain_captured_logs() -> Vec<CapturedLogEntry> {
    captured_logs().as_mut().map(|buffer| buffer.drain(..).collect()).unwrap_or_default()
}

/// Push a captured log entry to the buffer.
fn push_log_entry(entry: CapturedLogEntry) {
    if let Some(buffer) = captured_logs().as_mut() {
        if buffer.len() >= LOG_BUFFER_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }
}

/// Extract the node ID from a log message with format `[N] ...`.
/// Returns (node_id, remaining_message) if successful.
fn extract_node_id(message: &str) -> Option<(u32, &str)> {
    let trimmed = message.trim_start();
    if !trimmed.starts_with('[') {
        return None;
    }

    let end_bracket = trimmed.find(']')?;
    let node_id: u32 = trimmed[1..end_bracket].parse().ok()?;

    let rest = trimmed[end_bracket + 1..].trim_start();
    Some((node_id, rest))
}

/// A tee logger that forwards to the original logger and captures router logs.
pub struct TeeLogger {
    inner: env_logger::Logger,
}

impl TeeLogger {
    pub fn new(inner: env_logger::Logger) -> Self {
        Self { inner }
    }

    /// Maximum level to install: the inner filter, raised to Debug while
    /// capture is on so router events are captured even when the console
    /// shows less.
    pub fn filter(&self) -> log::LevelFilter {
        if capture_enabled() {
            self.inner.filter().max(log::LevelFilter::Debug)
        } else {
            self.inner.filter()
        }
    }
}

fn is_captured(target: &str, level: Level) -> bool {
    level <= Level::Debug && target.starts_with(CAPTURED_MODULE) && capture_enabled()
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        is_captured(metadata.target(), metadata.level()) || self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        // env_logger applies its own filter here, so console output is unchanged.
        self.inner.log(record);

        if record.module_path().is_some_and(|module| is_captured(module, record.level())) {
            let message = record.args().to_string();
            if let Some((node_id, content)) = extract_node_id(&message) {
                push_log_entry(CapturedLogEntry {
                    node_id,
                    timestamp: Local::now(),
                    content: content.to_string(),
                    level: record.level(),
                });
            }
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}
