//! Static cluster configuration.
//!
//! The cluster file lists every node, one per line:
//!
//! ```text
//! # id  host       port  heartbeat_seconds
//! 0     127.0.0.1  8000  1.0
//! 1     127.0.0.1  8001  1.0
//! 2     127.0.0.1  8002  1.0
//! ```
//!
//! The heartbeat column is optional and defaults to two seconds. The file is
//! read once at startup; membership never changes while a node runs.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};

use crate::clock::NodeId;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(2);

/// One row of the cluster file.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAddr {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
    pub heartbeat: Duration,
}

impl NodeAddr {
    /// `host:port`, suitable for binding a listener.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Every node of the cluster, keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    nodes: BTreeMap<NodeId, NodeAddr>,
}

impl ClusterConfig {
    pub fn new(nodes: Vec<NodeAddr>) -> Result<Self> {
        ensure!(!nodes.is_empty(), "cluster requires at least one node");

        let mut seen = HashSet::new();
        for node in &nodes {
            ensure!(seen.insert(node.id), "duplicate node id {}", node.id);
            ensure!(
                !node.heartbeat.is_zero(),
                "node {} has a zero heartbeat interval",
                node.id
            );
        }

        Ok(Self {
            nodes: nodes.into_iter().map(|node| (node.id, node)).collect(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cluster file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid cluster file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let node = parse_line(line).with_context(|| format!("line {}", index + 1))?;
            nodes.push(node);
        }
        Self::new(nodes)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeAddr> {
        self.nodes.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Every node except `id`.
    pub fn peers_of(&self, id: NodeId) -> Vec<NodeAddr> {
        self.nodes
            .values()
            .filter(|node| node.id != id)
            .cloned()
            .collect()
    }

    pub fn heartbeat_of(&self, id: NodeId) -> Option<Duration> {
        self.node(id).map(|node| node.heartbeat)
    }
}

fn parse_line(line: &str) -> Result<NodeAddr> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    ensure!(
        parts.len() == 3 || parts.len() == 4,
        "expected `<id> <host> <port> [heartbeat_seconds]`, got {} fields",
        parts.len()
    );

    let id = parts[0]
        .parse::<NodeId>()
        .with_context(|| format!("invalid node id `{}`", parts[0]))?;
    let host = parts[1].to_string();
    let port = parts[2]
        .parse::<u16>()
        .with_context(|| format!("invalid port `{}`", parts[2]))?;
    let heartbeat = match parts.get(3) {
        Some(raw) => parse_seconds(raw)?,
        None => DEFAULT_HEARTBEAT,
    };

    Ok(NodeAddr {
        id,
        host,
        port,
        heartbeat,
    })
}

fn parse_seconds(raw: &str) -> Result<Duration> {
    let seconds = raw
        .parse::<f64>()
        .with_context(|| format!("invalid heartbeat `{raw}`"))?;
    ensure!(
        seconds.is_finite() && seconds > 0.0,
        "heartbeat must be positive, got {raw}"
    );
    Duration::try_from_secs_f64(seconds).map_err(|err| anyhow!("heartbeat `{raw}`: {err}"))
}
