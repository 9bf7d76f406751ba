//! Operations exchanged between replicas.
//!
//! Every local write becomes one [`Operation`]; peers receive the full list of
//! accepted operations on each heartbeat and replay them.

use serde::{Deserialize, Serialize};

use crate::clock::{NodeId, VectorClock};

/// What an operation does to its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "del", alias = "delete")]
    Delete,
}

/// Immutable record of one mutation, stamped with the originator's full clock.
///
/// Field names are part of the `/sync` wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub key: String,
    /// New value; empty for deletes.
    pub value: String,
    pub op_type: OpType,
    /// Node that originated the write.
    pub src: NodeId,
    /// Snapshot of the originator's clock right after its local increment.
    pub ts: VectorClock,
}

impl Operation {
    /// Builds the operation for one `key -> value` pair of a change request.
    /// An empty value means delete.
    pub fn from_change(key: String, value: String, src: NodeId, ts: VectorClock) -> Self {
        let op_type = if value.is_empty() {
            OpType::Delete
        } else {
            OpType::Set
        };
        Self {
            key,
            value,
            op_type,
            src,
            ts,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.op_type == OpType::Delete
    }
}
