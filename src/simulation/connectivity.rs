//! Per-tick connectivity graph.
//!
//! Every ordered node pair is evaluated with the propagation model each tick
//! (O(n²)). The result fully replaces each node's neighbor set and its
//! one-hop routing table; nothing is carried over from the previous tick.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::geometry::{distance, units_to_meters};
use super::signal_calculations::{LinkBudget, evaluate_link};
use super::types::Node;

#[derive(Debug, Clone)]
pub struct ConnectivityGraph {
    meters_per_unit: f64,
    adjacency: BTreeMap<u32, BTreeSet<u32>>,
}

impl ConnectivityGraph {
    pub fn new(meters_per_unit: f64) -> Self {
        Self {
            meters_per_unit,
            adjacency: BTreeMap::new(),
        }
    }

    /// Recompute neighbor sets for all nodes from their current positions.
    ///
    /// Each node evaluates its links from its own radio parameters. Since all
    /// nodes share the same parameters the resulting relation is symmetric.
    pub fn recompute(&mut self, nodes: &mut BTreeMap<u32, Node>) {
        let mut adjacency: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();

        for (&id, node) in nodes.iter() {
            let neighbors = nodes
                .iter()
                .filter(|(other_id, _)| **other_id != id)
                .filter(|(_, other)| {
                    let meters = units_to_meters(distance(&node.position, &other.position), self.meters_per_unit);
                    evaluate_link(meters, &node.radio).connected
                })
                .map(|(&other_id, _)| other_id)
                .collect();
            adjacency.insert(id, neighbors);
        }

        for (id, node) in nodes.iter_mut() {
            node.replace_neighbors(adjacency.get(id).cloned().unwrap_or_default());
        }

        self.adjacency = adjacency;
    }

    /// Drop all cached adjacency, e.g. when the node batch is rebuilt.
    pub fn clear(&mut self) {
        self.adjacency.clear();
    }

    /// Undirected links as `(lower_id, higher_id)` pairs, in id order.
    pub fn links(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.adjacency
            .iter()
            .flat_map(|(&a, neighbors)| neighbors.range(a + 1..).map(move |&b| (a, b)))
    }

    /// Number of undirected links: each link appears in two neighbor sets.
    pub fn active_connections(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    pub fn max_degree(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).max().unwrap_or(0)
    }

    /// Link budget between two nodes as seen by `from`.
    pub fn link_budget(&self, nodes: &BTreeMap<u32, Node>, from: u32, to: u32) -> Option<LinkBudget> {
        let a = nodes.get(&from)?;
        let b = nodes.get(&to)?;
        let meters = units_to_meters(distance(&a.position, &b.position), self.meters_per_unit);
        Some(evaluate_link(meters, &a.radio))
    }

    /// Breadth-first closure over the current neighbor sets, including `start`.
    ///
    /// For observers and verification only; the flood protocol never
    /// consults multi-hop reachability.
    pub fn reachable_from(&self, start: u32) -> BTreeSet<u32> {
        let mut reached = BTreeSet::new();
        if !self.adjacency.contains_key(&start) {
            return reached;
        }
        let mut frontier = VecDeque::from([start]);
        reached.insert(start);
        while let Some(current) = frontier.pop_front() {
            for &next in self.adjacency.get(&current).into_iter().flatten() {
                if reached.insert(next) {
                    frontier.push_back(next);
                }
            }
        }
        reached
    }
}
