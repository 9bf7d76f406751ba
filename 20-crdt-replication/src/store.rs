//! Replicated key-value state and the rules for accepting operations.
//!
//! A [`Replica`] is the whole mutable state of one node: the materialized data,
//! a causal version per key, the node's own vector clock, and the log of every
//! operation it accepted. The log is what gets gossiped to peers.
//!
//! `Replica` does no locking of its own. [`crate::node::Node`] keeps it behind a
//! single mutex so that the dominance check, the mutation and the log append
//! are observed as one step.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::clock::{Dominance, NodeId, VectorClock};
use crate::operation::{OpType, Operation};

/// Full state of one node.
#[derive(Debug)]
pub struct Replica {
    node_id: NodeId,
    log: Vec<Operation>,
    data: BTreeMap<String, String>,
    data_ts: BTreeMap<String, VectorClock>,
    cur_ts: VectorClock,
}

/// Diagnostic view returned by `/state_dump`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateDump {
    pub data: BTreeMap<String, String>,
    pub data_ts: BTreeMap<String, VectorClock>,
    pub cur_ts: VectorClock,
}

impl Replica {
    /// Empty replica for `node_id`; its clock starts at `{node_id: 0}`.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            log: Vec::new(),
            data: BTreeMap::new(),
            data_ts: BTreeMap::new(),
            cur_ts: VectorClock::for_node(node_id),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn data_ts(&self) -> &BTreeMap<String, VectorClock> {
        &self.data_ts
    }

    pub fn cur_ts(&self) -> &VectorClock {
        &self.cur_ts
    }

    pub fn log(&self) -> &[Operation] {
        &self.log
    }

    /// Relationship between `incoming` and the stored version of `key`.
    /// A key that was never stamped is always behind.
    pub fn dominance(&self, incoming: &VectorClock, key: &str) -> Dominance {
        match self.data_ts.get(key) {
            None => Dominance::IncomingDominates,
            Some(stored) => incoming.compare(stored),
        }
    }

    /// Whether `op` should replace the stored state of its key.
    ///
    /// Concurrent writes are settled by value: the strictly greater string
    /// wins. A deleted key compares as the empty string, so a concurrent set
    /// always beats a delete. Every replica evaluates the same rule, which is
    /// what lets them agree without talking to each other.
    pub fn should_apply(&self, op: &Operation) -> bool {
        match self.dominance(&op.ts, &op.key) {
            Dominance::IncomingDominates => true,
            Dominance::Concurrent => {
                let stored = self.data.get(&op.key).map(String::as_str).unwrap_or("");
                op.value.as_str() > stored
            }
            Dominance::StoredDominates | Dominance::Equal => false,
        }
    }

    /// Applies `op` if it wins against the stored state. Returns whether it
    /// was accepted. Re-applying an accepted operation is a no-op.
    pub fn apply(&mut self, op: Operation) -> bool {
        if !self.should_apply(&op) {
            debug!(key = %op.key, src = op.src, "operation superseded, ignoring");
            return false;
        }

        match op.op_type {
            OpType::Set => {
                self.data.insert(op.key.clone(), op.value.clone());
            }
            OpType::Delete => {
                self.data.remove(&op.key);
            }
        }

        // Element-wise max: a winning concurrent stamp may be behind the
        // stored version on some nodes, and key versions never go down.
        self.data_ts.entry(op.key.clone()).or_default().merge(&op.ts);

        debug!(key = %op.key, src = op.src, op_type = ?op.op_type, "operation applied");
        self.log.push(op);
        true
    }

    /// Stamps and applies one local change. The increment and the snapshot
    /// happen in the same call, so two writes can never share a counter.
    pub fn local_write(&mut self, key: String, value: String) -> Operation {
        self.cur_ts.increment(self.node_id);
        let op = Operation::from_change(key, value, self.node_id, self.cur_ts.clone());
        self.apply(op.clone());
        op
    }

    /// Replays an operation received from a peer and learns its clock.
    pub fn ingest(&mut self, op: Operation) -> bool {
        let ts = op.ts.clone();
        let applied = self.apply(op);
        self.cur_ts.merge(&ts);
        applied
    }

    pub fn dump(&self) -> StateDump {
        StateDump {
            data: self.data.clone(),
            data_ts: self.data_ts.clone(),
            cur_ts: self.cur_ts.clone(),
        }
    }
}
