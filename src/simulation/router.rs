//! Flood routing with duplicate suppression.
//!
//! Per (node, message) the protocol has three states: unseen, seen and
//! delivered (this node is the destination), seen and forwarded. The `seen`
//! set is the only loop prevention; there is no TTL.
//!
//! Delivery is synchronous: handing a message to a neighbor runs ingestion on
//! that neighbor immediately, which may queue a forward. Queues are drained
//! in node order and then repeatedly until all are empty, so everything a
//! tick's broadcasts trigger resolves within that tick. Every node queues a
//! given message at most once, which bounds the work per message by
//! `node_count * max_degree` deliveries.
//!
//! Log lines carry a `[node_id]` prefix so the log capture can attribute them.
//! Originations and deliveries log at debug; per-hop receptions log at trace,
//! below the level the capture raises the logger to.

use embassy_time::{Duration, Instant};
use serde::Serialize;
use std::collections::BTreeMap;

use super::types::{ForwardEntry, Message, MessageId, MessageKind, Node};
use crate::error::SimulationError;

/// Outcome of offering a message to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Already seen; dropped.
    Duplicate,
    /// This node is the destination; consumed, never forwarded.
    Delivered,
    /// Queued for rebroadcast on the next drain.
    Queued,
}

/// Cumulative protocol counters since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub beacons_originated: u64,
    pub messages_originated: u64,
    pub deliveries_attempted: u64,
    pub duplicates_suppressed: u64,
    pub forwards_queued: u64,
    pub delivered_to_destination: u64,
}

/// Work done by one protocol phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    /// Queue entries drained (each one rebroadcast to the current neighbors).
    pub forwards_drained: usize,
    pub beacons: usize,
    /// Extra draining passes needed after the ordered pass to reach a fixed point.
    pub settle_rounds: usize,
}

#[derive(Debug, Clone)]
pub struct FloodRouter {
    broadcast_interval: Duration,
    stats: RouterStats,
}

impl FloodRouter {
    pub fn new(broadcast_interval: Duration) -> Self {
        Self {
            broadcast_interval,
            stats: RouterStats::default(),
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RouterStats::default();
    }

    /// Offer `message`, arriving from neighbor `from`, to `node`.
    pub fn ingest(&mut self, node: &mut Node, message: &Message, from: u32, now: Instant) -> Ingest {
        if !node.seen.insert(message.id) {
            self.stats.duplicates_suppressed += 1;
            return Ingest::Duplicate;
        }
        log::trace!("[{}] received message {} from node {}", node.node_id, message.id, from);

        if message.destination == Some(node.node_id) {
            node.delivered.push(message.id);
            self.stats.delivered_to_destination += 1;
            log::debug!("[{}] processed message {}", node.node_id, message.id);
            return Ingest::Delivered;
        }

        node.push_forward(ForwardEntry {
            message: message.clone(),
            arrived_from: from,
            arrived_at: now,
        });
        self.stats.forwards_queued += 1;
        Ingest::Queued
    }

    fn deliver(&mut self, nodes: &mut BTreeMap<u32, Node>, target: u32, message: &Message, from: u32, now: Instant) -> Result<Ingest, SimulationError> {
        let node = nodes.get_mut(&target).ok_or(SimulationError::UnknownNode(target))?;
        self.stats.deliveries_attempted += 1;
        Ok(self.ingest(node, message, from, now))
    }

    /// Drain one node's forward queue to its current neighbors, skipping the
    /// neighbor each entry arrived from. Returns the number of entries drained.
    pub fn drain(&mut self, nodes: &mut BTreeMap<u32, Node>, node_id: u32, now: Instant) -> Result<usize, SimulationError> {
        let (entries, neighbors) = {
            let node = nodes.get_mut(&node_id).ok_or(SimulationError::UnknownNode(node_id))?;
            if node.forward_queue.is_empty() {
                return Ok(0);
            }
            (std::mem::take(&mut node.forward_queue), node.neighbors.clone())
        };

        let drained = entries.len();
        for entry in entries {
            for &neighbor in neighbors.iter().filter(|&&n| n != entry.arrived_from) {
                self.deliver(nodes, neighbor, &entry.message, node_id, now)?;
            }
        }
        Ok(drained)
    }

    /// Create a message at `node_id` and hand it to all of its current neighbors.
    ///
    /// The originator does not record its own message. Every neighbor first
    /// receives it directly from the originator, so the arrived-from skip keeps
    /// it from coming back within the same tick.
    pub fn originate(
        &mut self,
        nodes: &mut BTreeMap<u32, Node>,
        node_id: u32,
        destination: Option<u32>,
        kind: MessageKind,
        now: Instant,
    ) -> Result<MessageId, SimulationError> {
        let (message, neighbors) = {
            let node = nodes.get_mut(&node_id).ok_or(SimulationError::UnknownNode(node_id))?;
            let message = node.create_message(destination, kind, now);
            (message, node.neighbors.clone())
        };

        match kind {
            MessageKind::Beacon => {
                self.stats.beacons_originated += 1;
                log::debug!("[{}] broadcasting {}", node_id, message.id);
            }
            MessageKind::Directed => {
                self.stats.messages_originated += 1;
                match destination {
                    Some(dest) => log::debug!("[{}] sending {} to node {}", node_id, message.id, dest),
                    None => log::debug!("[{}] flooding {}", node_id, message.id),
                }
            }
        }

        for &neighbor in &neighbors {
            self.deliver(nodes, neighbor, &message, node_id, now)?;
        }
        Ok(message.id)
    }

    /// Broadcast a beacon from `node_id` if more than the broadcast interval
    /// of wall-clock time has passed since its last one.
    pub fn broadcast_if_due(&mut self, nodes: &mut BTreeMap<u32, Node>, node_id: u32, now: Instant) -> Result<Option<MessageId>, SimulationError> {
        let due = {
            let node = nodes.get(&node_id).ok_or(SimulationError::UnknownNode(node_id))?;
            now.saturating_duration_since(node.last_broadcast_at) > self.broadcast_interval
        };
        if !due {
            return Ok(None);
        }

        let id = self.originate(nodes, node_id, None, MessageKind::Beacon, now)?;
        if let Some(node) = nodes.get_mut(&node_id) {
            node.last_broadcast_at = now;
        }
        Ok(Some(id))
    }

    /// Drain every queue until none has pending entries.
    pub fn settle(&mut self, nodes: &mut BTreeMap<u32, Node>, now: Instant) -> Result<PhaseReport, SimulationError> {
        let ids: Vec<u32> = nodes.keys().copied().collect();
        let mut report = PhaseReport::default();
        loop {
            let mut drained = 0;
            for &id in &ids {
                drained += self.drain(nodes, id, now)?;
            }
            if drained == 0 {
                return Ok(report);
            }
            report.forwards_drained += drained;
            report.settle_rounds += 1;
        }
    }

    /// Protocol phase of a tick. Connectivity must already be recomputed.
    ///
    /// Each node, in id order, drains its queue and then checks its beacon
    /// timer; afterwards the queues are settled to a fixed point.
    pub fn run_phase(&mut self, nodes: &mut BTreeMap<u32, Node>, now: Instant) -> Result<PhaseReport, SimulationError> {
        let ids: Vec<u32> = nodes.keys().copied().collect();
        let mut report = PhaseReport::default();
        for id in ids {
            report.forwards_drained += self.drain(nodes, id, now)?;
            if self.broadcast_if_due(nodes, id, now)?.is_some() {
                report.beacons += 1;
            }
        }

        let settled = self.settle(nodes, now)?;
        report.forwards_drained += settled.forwards_drained;
        report.settle_rounds = settled.settle_rounds;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::connectivity::ConnectivityGraph;
    use crate::simulation::types::{Point, RadioParameters, Velocity};
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashMap};

    const INTERVAL: Duration = Duration::from_millis(1000);

    fn node(id: u32, x: f64, y: f64) -> Node {
        Node::new(id, Point { x, y }, Velocity { x: 0.0, y: 0.0 }, RadioParameters::default(), Instant::from_millis(0))
    }

    /// Chain 1-2-3-...-count with 800 m links at 10 m per unit.
    fn chain(count: u32) -> BTreeMap<u32, Node> {
        let mut nodes: BTreeMap<u32, Node> = (1..=count).map(|id| (id, node(id, 20.0 + 80.0 * (id - 1) as f64, 50.0))).collect();
        ConnectivityGraph::new(10.0).recompute(&mut nodes);
        nodes
    }

    fn beacon_from(nodes: &mut BTreeMap<u32, Node>, id: u32) -> Message {
        nodes.get_mut(&id).map(|n| n.create_message(None, MessageKind::Beacon, Instant::from_millis(1))).unwrap()
    }

    #[test]
    fn duplicate_is_suppressed() {
        let mut nodes = chain(2);
        let mut router = FloodRouter::new(INTERVAL);
        let message = beacon_from(&mut nodes, 1);
        let n2 = nodes.get_mut(&2).unwrap();

        assert_eq!(router.ingest(n2, &message, 1, Instant::from_millis(2)), Ingest::Queued);
        assert_eq!(router.ingest(n2, &message, 1, Instant::from_millis(3)), Ingest::Duplicate);
        assert_eq!(n2.forward_queue.len(), 1);
        assert_eq!(router.stats().duplicates_suppressed, 1);
    }

    #[test]
    fn destination_consumes_without_forwarding() {
        let mut nodes = chain(3);
        let mut router = FloodRouter::new(INTERVAL);
        let now = Instant::from_millis(10);

        router.originate(&mut nodes, 1, Some(2), MessageKind::Directed, now).unwrap();
        router.settle(&mut nodes, now).unwrap();

        assert_eq!(nodes[&2].delivered.len(), 1);
        assert!(nodes[&2].forward_queue.is_empty());
        // Node 3 is only reachable through the destination, which does not relay.
        assert!(nodes[&3].seen.is_empty());
        assert_eq!(router.stats().delivered_to_destination, 1);
    }

    #[test]
    fn drain_skips_the_sender() {
        let mut nodes = chain(3);
        let mut router = FloodRouter::new(INTERVAL);
        let now = Instant::from_millis(10);
        let message = beacon_from(&mut nodes, 1);

        let n2 = nodes.get_mut(&2).unwrap();
        router.ingest(n2, &message, 1, now);
        let drained = router.drain(&mut nodes, 2, now).unwrap();

        assert_eq!(drained, 1);
        assert!(nodes[&3].has_seen(&message.id));
        // Node 1 created but never ingested the message; the back-edge was skipped.
        assert!(!nodes[&1].has_seen(&message.id));
        assert_eq!(router.stats().deliveries_attempted, 1);
    }

    #[test]
    fn flood_crosses_the_chain_in_one_phase() {
        let mut nodes = chain(6);
        let mut router = FloodRouter::new(INTERVAL);
        // Only node 1 is due.
        for (id, n) in nodes.iter_mut() {
            n.last_broadcast_at = if *id == 1 { Instant::from_millis(0) } else { Instant::from_millis(1500) };
        }

        let report = router.run_phase(&mut nodes, Instant::from_millis(1500)).unwrap();
        assert_eq!(report.beacons, 1);
        let id = MessageId { originator: 1, sequence: 0 };
        assert!(!nodes[&1].has_seen(&id));
        for n in nodes.values().filter(|n| n.node_id != 1) {
            assert!(n.has_seen(&id), "node {} missed the beacon", n.node_id);
        }
        assert!(nodes.values().all(|n| n.forward_queue.is_empty()));
        assert_eq!(nodes[&1].last_broadcast_at, Instant::from_millis(1500));
    }

    #[test]
    fn beacon_waits_for_the_interval() {
        let mut nodes = chain(2);
        let mut router = FloodRouter::new(INTERVAL);
        assert_eq!(router.broadcast_if_due(&mut nodes, 1, Instant::from_millis(1000)).unwrap(), None);
        assert!(router.broadcast_if_due(&mut nodes, 1, Instant::from_millis(1001)).unwrap().is_some());
        assert_eq!(router.broadcast_if_due(&mut nodes, 1, Instant::from_millis(1500)).unwrap(), None);
    }

    #[test]
    fn isolated_node_broadcasts_into_the_void() {
        let mut nodes: BTreeMap<u32, Node> = [(1, node(1, 20.0, 20.0)), (2, node(2, 700.0, 500.0))].into_iter().collect();
        ConnectivityGraph::new(10.0).recompute(&mut nodes);
        let mut router = FloodRouter::new(INTERVAL);

        router.originate(&mut nodes, 1, Some(2), MessageKind::Directed, Instant::from_millis(5)).unwrap();
        assert!(nodes[&2].seen.is_empty());
        assert!(nodes[&1].seen.is_empty());
        assert_eq!(router.stats().deliveries_attempted, 0);
    }

    #[test]
    fn unknown_node_is_an_error() {
        let mut nodes = chain(2);
        let mut router = FloodRouter::new(INTERVAL);
        let err = router.drain(&mut nodes, 99, Instant::from_millis(0)).unwrap_err();
        assert_eq!(err, SimulationError::UnknownNode(99));
    }

    proptest! {
        #[test]
        fn flood_reaches_the_whole_component_exactly_once(
            positions in prop::collection::vec((20.0f64..300.0, 20.0f64..300.0), 2..30),
            origin_pick in any::<prop::sample::Index>(),
        ) {
            let mut nodes: BTreeMap<u32, Node> = positions
                .iter()
                .enumerate()
                .map(|(i, (x, y))| (i as u32 + 1, node(i as u32 + 1, *x, *y)))
                .collect();
            let mut graph = ConnectivityGraph::new(10.0);
            graph.recompute(&mut nodes);
            let origin = origin_pick.index(nodes.len()) as u32 + 1;
            let mut router = FloodRouter::new(INTERVAL);
            let now = Instant::from_millis(10);

            let id = router.originate(&mut nodes, origin, None, MessageKind::Directed, now).unwrap();
            router.settle(&mut nodes, now).unwrap();

            // Everyone connected to the originator, and never the originator itself.
            let mut component = graph.reachable_from(origin);
            component.remove(&origin);
            let reached: BTreeSet<u32> = nodes.values().filter(|n| n.has_seen(&id)).map(|n| n.node_id).collect();
            prop_assert_eq!(reached, component);

            // Every node queued the message at most once: dedup held.
            let forwards = router.stats().forwards_queued;
            prop_assert!(forwards <= nodes.len() as u64);

            // Termination bound on delivery attempts.
            let bound = (nodes.len() * graph.max_degree().max(1)) as u64;
            prop_assert!(router.stats().deliveries_attempted <= bound);

            let per_node: HashMap<u32, usize> = nodes.values().map(|n| (n.node_id, n.forward_queue.len())).collect();
            prop_assert!(per_node.values().all(|&len| len == 0));
        }
    }
}
