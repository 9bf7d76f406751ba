//! Vector clocks used to stamp operations and track per-key causality.
//!
//! A [`VectorClock`] maps node ids to counters. Each node owns exactly one entry
//! (its own id) and is the only one allowed to increment it; entries for other
//! nodes only move forward by merging clocks received from peers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a cluster member, as listed in the cluster file.
pub type NodeId = u64;

/// Causal relationship between an incoming stamp and a stored one.
///
/// Variants are named from the point of view of the incoming side, which is
/// how the store consumes them when deciding whether to apply an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dominance {
    /// The incoming stamp has seen everything the stored one has, and more.
    IncomingDominates,
    /// The stored stamp has seen everything the incoming one has, and more.
    StoredDominates,
    /// Each side knows something the other does not.
    Concurrent,
    /// Identical knowledge on both sides.
    Equal,
}

/// Mapping from node id to the highest counter known for that node.
///
/// Backed by a `BTreeMap` so serialized dumps list nodes in id order. On the
/// wire the clock is a JSON object keyed by the decimal node id:
/// `{"0": 3, "2": 1}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Startup clock for `node`: its own entry present at zero, nothing else.
    pub fn for_node(node: NodeId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(node, 0);
        Self { entries }
    }

    pub fn get(&self, node: NodeId) -> Option<u64> {
        self.entries.get(&node).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, u64)> + '_ {
        self.entries.iter().map(|(node, t)| (*node, *t))
    }

    /// Raises `node`'s counter by one and returns the new value.
    pub fn increment(&mut self, node: NodeId) -> u64 {
        let counter = self.entries.entry(node).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Element-wise max with `other`. Never lowers an entry.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, t) in other.iter() {
            let current = self.entries.entry(node).or_insert(t);
            if *current < t {
                *current = t;
            }
        }
    }

    /// Classifies `incoming` (self) against `stored`.
    ///
    /// A node present on one side but missing on the other puts the side that
    /// has the entry ahead, even when the counter is zero: the missing side
    /// has no knowledge of that node at all.
    pub fn compare(&self, stored: &VectorClock) -> Dominance {
        let mut incoming_ahead = false;
        let mut stored_ahead = false;

        for (node, t) in self.iter() {
            match stored.get(node) {
                None => incoming_ahead = true,
                Some(s) if s < t => incoming_ahead = true,
                Some(s) if s > t => stored_ahead = true,
                Some(_) => {}
            }
        }

        if stored.entries.keys().any(|node| !self.entries.contains_key(node)) {
            stored_ahead = true;
        }

        match (incoming_ahead, stored_ahead) {
            (false, false) => Dominance::Equal,
            (true, false) => Dominance::IncomingDominates,
            (false, true) => Dominance::StoredDominates,
            (true, true) => Dominance::Concurrent,
        }
    }
}

impl FromIterator<(NodeId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (NodeId, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
