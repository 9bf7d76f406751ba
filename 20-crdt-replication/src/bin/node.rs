//! Runs one replica of the cluster.
//!
//! ```bash
//! # cluster.conf: `<id> <host> <port> [heartbeat_seconds]` per line
//! cargo run --bin node -- 0 cluster.conf
//! cargo run --bin node -- 1 cluster.conf
//! cargo run --bin node -- 2 cluster.conf
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crdt_replication::api;
use crdt_replication::broadcast::{BroadcastSettings, Broadcaster, DEFAULT_PUSH_TIMEOUT};
use crdt_replication::clock::NodeId;
use crdt_replication::config::ClusterConfig;
use crdt_replication::node::Node;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a replicated key-value node")]
struct Args {
    /// This node's id; must appear in the cluster file
    id: NodeId,

    /// Cluster file listing `<id> <host> <port> [heartbeat_seconds]` per line
    #[arg(value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Override the heartbeat interval from the cluster file, in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_ms: Option<u64>,

    /// Timeout for a single log push to a peer, in milliseconds
    #[arg(
        long,
        default_value_t = DEFAULT_PUSH_TIMEOUT.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    push_timeout_ms: u64,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let cluster = ClusterConfig::load(&args.config)?;
    let me = cluster
        .node(args.id)
        .cloned()
        .with_context(|| format!("node {} is not in {}", args.id, args.config.display()))?;

    let interval = args
        .heartbeat_ms
        .map(Duration::from_millis)
        .unwrap_or(me.heartbeat);
    let settings = BroadcastSettings {
        interval,
        push_timeout: Duration::from_millis(args.push_timeout_ms),
    };

    let node = Node::new(me.id, cluster);
    let listener = TcpListener::bind(me.socket_addr())
        .await
        .with_context(|| format!("failed to bind {}", me.socket_addr()))?;
    info!(
        node_id = me.id,
        addr = %listener.local_addr()?,
        peers = node.peers().len(),
        "node listening"
    );

    let heartbeat = Broadcaster::new(node.clone(), settings)?.spawn();
    let served = api::serve(listener, node, shutdown_signal()).await;

    heartbeat.shutdown().await?;
    info!(node_id = me.id, "node stopped");
    served
}
