//! Anti-entropy broadcaster.
//!
//! Every heartbeat the node copies its whole operation log under the lock,
//! encodes it once, and pushes it to each peer's `/sync` from its own task.
//! Pushes are fire-and-forget: a peer that is down or slow simply misses this
//! round and gets the full log again on the next one. The heartbeat loop never
//! waits for pushes to finish, so one stuck peer cannot slow the cadence.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::api::NODE_ID_HEADER;
use crate::clock::NodeId;
use crate::config::NodeAddr;
use crate::node::Node;

pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    /// Delay between the end of one log snapshot and the next.
    pub interval: Duration,
    /// Upper bound on a single push to a peer.
    pub push_timeout: Duration,
}

impl BroadcastSettings {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }
}

pub struct Broadcaster {
    node: Node,
    client: Client,
    settings: BroadcastSettings,
}

/// Running heartbeat task. Dropping the handle also stops the loop, but only
/// [`BroadcastHandle::shutdown`] waits for it to exit.
pub struct BroadcastHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BroadcastHandle {
    /// Signals the heartbeat loop to stop and waits for it to exit. Pushes
    /// already in flight are left to finish or time out on their own.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.stop_tx.send(true);
        self.task.await.context("broadcaster task failed")
    }
}

impl Broadcaster {
    pub fn new(node: Node, settings: BroadcastSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.push_timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            node,
            client,
            settings,
        })
    }

    pub fn spawn(self) -> BroadcastHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        BroadcastHandle { stop_tx, task }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        info!(
            node_id = self.node.id(),
            interval_ms = self.settings.interval.as_millis() as u64,
            peers = self.node.peers().len(),
            "heartbeat started"
        );

        loop {
            tokio::select! {
                // A dropped sender counts as a stop request too.
                _ = stop_rx.changed() => break,
                _ = sleep(self.settings.interval) => {}
            }

            if let Err(err) = self.broadcast_once().await {
                warn!(node_id = self.node.id(), error = ?err, "heartbeat failed");
            }
        }

        info!(node_id = self.node.id(), "heartbeat stopped");
    }

    /// Snapshots the log and starts one push per peer. Returns the number of
    /// pushes started, without waiting for any of them.
    pub async fn broadcast_once(&self) -> Result<usize> {
        let log = self.node.log_snapshot().await;
        let body = Bytes::from(serde_json::to_vec(&log).context("failed to encode log")?);
        let peers = self.node.peers();

        debug!(
            node_id = self.node.id(),
            ops = log.len(),
            peers = peers.len(),
            "broadcasting log"
        );

        for peer in &peers {
            tokio::spawn(push_log(
                self.client.clone(),
                self.node.id(),
                peer.clone(),
                body.clone(),
            ));
        }

        Ok(peers.len())
    }
}

async fn push_log(client: Client, sender: NodeId, peer: NodeAddr, body: Bytes) {
    let url = format!("{}/sync", peer.base_url());
    let result = client
        .put(&url)
        .header(CONTENT_TYPE, "application/json")
        .header(NODE_ID_HEADER, sender.to_string())
        .body(body)
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => {
            debug!(peer = peer.id, "log delivered");
        }
        Ok(resp) => {
            warn!(peer = peer.id, status = %resp.status(), "peer rejected log");
        }
        Err(err) => {
            // Expected while a peer is down; the next heartbeat resends.
            debug!(peer = peer.id, error = %err, "log push dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api;
    use crate::config::ClusterConfig;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    #[tokio::test]
    async fn unreachable_peers_are_dropped_silently() -> Result<()> {
        // Bind and release a port so nothing is listening on it.
        let port = TcpListener::bind("127.0.0.1:0").await?.local_addr()?.port();
        let cluster = ClusterConfig::parse(&format!(
            "0 127.0.0.1 1 0.05\n1 127.0.0.1 {port} 0.05\n"
        ))?;
        let node = Node::new(0, cluster);
        node.change(vec![("k".to_string(), "v".to_string())]).await;
        let before = node.state_dump().await;

        let mut settings = BroadcastSettings::new(Duration::from_millis(50));
        settings.push_timeout = Duration::from_millis(200);
        let broadcaster = Broadcaster::new(node.clone(), settings)?;
        assert_eq!(broadcaster.broadcast_once().await?, 1);

        // Let the failed push run out before looking at the node again.
        sleep(Duration::from_millis(300)).await;
        assert_eq!(node.state_dump().await, before);
        assert_eq!(node.log_snapshot().await.len(), 1);

        // The next round starts a fresh push as if nothing happened.
        assert_eq!(broadcaster.broadcast_once().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn heartbeat_delivers_log_and_stops_on_shutdown() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let cluster = ClusterConfig::parse(&format!(
            "0 127.0.0.1 1 0.05\n1 127.0.0.1 {port} 0.05\n"
        ))?;

        let receiver = Node::new(1, cluster.clone());
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(api::serve(listener, receiver.clone(), async move {
            let _ = stop_rx.await;
        }));

        let sender = Node::new(0, cluster);
        sender
            .change(vec![("k".to_string(), "v0".to_string())])
            .await;
        let handle = Broadcaster::new(sender, BroadcastSettings::new(Duration::from_millis(50)))?
            .spawn();

        timeout(Duration::from_secs(5), async {
            while receiver.values().await.get("k").map(String::as_str) != Some("v0") {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .context("log was never delivered")?;

        assert_eq!(receiver.state_dump().await.cur_ts.get(0), Some(1));

        timeout(Duration::from_secs(1), handle.shutdown()).await??;
        let _ = stop_tx.send(());
        server.await??;
        Ok(())
    }
}
