//! Type definitions for the simulation.
//!
//! Contains the data structures shared across the simulation:
//! - World geometry (points, velocities, bounds)
//! - Radio parameters shared by every node
//! - Flood messages and their identifiers
//! - Node state (mobility, neighbor cache, protocol state)

use embassy_time::Instant;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;

/// Maximum number of forward queue entries per node before overflow warnings.
///
/// Dedup guarantees a node queues each message at most once, so the queue can
/// only grow this large when many distinct messages arrive in a single tick.
pub const FORWARD_QUEUE_WARNING_THRESHOLD: usize = 256;

/// Simple 2D point in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Velocity in world units per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
}

/// Rectangular world the nodes move in, with the reflective margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
}

impl Bounds {
    pub fn min_x(&self) -> f64 {
        self.margin
    }

    pub fn max_x(&self) -> f64 {
        self.width - self.margin
    }

    pub fn min_y(&self) -> f64 {
        self.margin
    }

    pub fn max_y(&self) -> f64 {
        self.height - self.margin
    }
}

/// Radio parameters. Identical for every node, which is what makes the
/// connectivity relation symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RadioParameters {
    /// Carrier frequency in MHz.
    pub frequency_mhz: f64,
    /// Transmit power at the antenna port in dBm.
    pub transmit_power_dbm: f64,
    /// Minimum received power the receiver can decode, in dBm.
    pub sensitivity_dbm: f64,
}

impl Default for RadioParameters {
    fn default() -> Self {
        Self {
            frequency_mhz: 868.7,
            transmit_power_dbm: 14.0,
            sensitivity_dbm: -110.0,
        }
    }
}

/// Unique message identifier: originator plus that node's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageId {
    pub originator: u32,
    pub sequence: u32,
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.originator, self.sequence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    /// Periodic self-initiated broadcast.
    Beacon,
    /// Message injected on request, optionally addressed to one node.
    Directed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub originator: u32,
    /// `None` floods the message to every reachable node.
    pub destination: Option<u32>,
    pub created_at: Instant,
    pub kind: MessageKind,
}

/// Pending rebroadcast in a node's forward queue.
#[derive(Debug, Clone)]
pub struct ForwardEntry {
    pub message: Message,
    /// Neighbor the message arrived from; it is skipped when forwarding.
    pub arrived_from: u32,
    pub arrived_at: Instant,
}

/// One-hop routing table entry. Always `hops == 1` and `next_hop == neighbor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub next_hop: u32,
    pub hops: u8,
}

/// Mobile radio node.
///
/// `neighbors` and `routing_table` are snapshots of the current tick and are
/// replaced wholesale by the connectivity recompute. `seen` only grows until
/// the node batch is rebuilt.
#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: u32,
    pub position: Point,
    pub velocity: Velocity,
    pub radio: RadioParameters,
    pub neighbors: BTreeSet<u32>,
    pub routing_table: BTreeMap<u32, RouteEntry>,
    pub seen: HashSet<MessageId>,
    pub delivered: Vec<MessageId>,
    pub forward_queue: VecDeque<ForwardEntry>,
    pub last_broadcast_at: Instant,
    next_sequence: u32,
}

impl Node {
    pub fn new(node_id: u32, position: Point, velocity: Velocity, radio: RadioParameters, created_at: Instant) -> Self {
        Self {
            node_id,
            position,
            velocity,
            radio,
            neighbors: BTreeSet::new(),
            routing_table: BTreeMap::new(),
            seen: HashSet::new(),
            delivered: Vec::new(),
            forward_queue: VecDeque::new(),
            last_broadcast_at: created_at,
            next_sequence: 0,
        }
    }

    /// Build a new message originated by this node, consuming a sequence number.
    pub fn create_message(&mut self, destination: Option<u32>, kind: MessageKind, now: Instant) -> Message {
        let id = MessageId {
            originator: self.node_id,
            sequence: self.next_sequence,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        Message {
            id,
            originator: self.node_id,
            destination,
            created_at: now,
            kind,
        }
    }

    /// Push a forward entry, warning when the queue grows unusually long.
    pub fn push_forward(&mut self, entry: ForwardEntry) {
        if self.forward_queue.len() >= FORWARD_QUEUE_WARNING_THRESHOLD {
            log::warn!(
                "Node {} forward queue is long: {} entries pending",
                self.node_id,
                self.forward_queue.len()
            );
        }
        self.forward_queue.push_back(entry);
    }

    /// Replace the neighbor set and rebuild the one-hop routing table from it.
    pub fn replace_neighbors(&mut self, neighbors: BTreeSet<u32>) {
        self.routing_table = neighbors
            .iter()
            .map(|&id| (id, RouteEntry { next_hop: id, hops: 1 }))
            .collect();
        self.neighbors = neighbors;
    }

    pub fn has_seen(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }
}
