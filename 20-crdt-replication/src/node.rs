//! The node service shared by the HTTP handlers and the broadcaster.
//!
//! [`Node`] owns the node's [`Replica`] behind one `tokio` mutex. Every read or
//! mutation of replica state goes through it, so a handler can never observe an
//! operation half applied.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::NodeId;
use crate::config::{ClusterConfig, NodeAddr};
use crate::operation::Operation;
use crate::store::{Replica, StateDump};

/// Cheaply cloneable handle to one node's state and cluster view.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    id: NodeId,
    cluster: ClusterConfig,
    replica: Mutex<Replica>,
}

/// Outcome of replaying a peer's log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub ignored: usize,
}

impl Node {
    pub fn new(id: NodeId, cluster: ClusterConfig) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id,
                cluster,
                replica: Mutex::new(Replica::new(id)),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Every configured node other than this one.
    pub fn peers(&self) -> Vec<NodeAddr> {
        self.inner.cluster.peers_of(self.inner.id)
    }

    /// Applies a batch of local changes, one operation per pair, in order.
    ///
    /// Each pair takes the lock on its own: increment, stamp and apply are one
    /// atomic unit, but other requests may interleave between pairs.
    pub async fn change<I>(&self, changes: I) -> Vec<Operation>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut stamped = Vec::new();
        for (key, value) in changes {
            let op = self.inner.replica.lock().await.local_write(key, value);
            debug!(node_id = self.id(), key = %op.key, op_type = ?op.op_type, "local write");
            stamped.push(op);
        }
        stamped
    }

    /// Replays a peer's log. Each operation is applied and its clock merged
    /// while the lock is held.
    pub async fn sync(&self, ops: Vec<Operation>) -> SyncReport {
        let mut report = SyncReport::default();
        for op in ops {
            let applied = self.inner.replica.lock().await.ingest(op);
            if applied {
                report.applied += 1;
            } else {
                report.ignored += 1;
            }
        }
        if report.applied > 0 {
            info!(node_id = self.id(), applied = report.applied, "synced operations from peer");
        }
        report
    }

    pub async fn values(&self) -> BTreeMap<String, String> {
        self.inner.replica.lock().await.data().clone()
    }

    pub async fn state_dump(&self) -> StateDump {
        self.inner.replica.lock().await.dump()
    }

    /// Copy of the full operation log, taken under the lock.
    pub async fn log_snapshot(&self) -> Vec<Operation> {
        self.inner.replica.lock().await.log().to_vec()
    }
}
