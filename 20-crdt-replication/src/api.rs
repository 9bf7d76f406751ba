//! HTTP surface of a node.
//!
//! | Route              | Purpose                                   |
//! |--------------------|-------------------------------------------|
//! | `PATCH /change`    | apply local writes (`""` deletes a key)   |
//! | `PUT /sync`        | replay a peer's operation log             |
//! | `GET /values`      | current key/value mapping                 |
//! | `GET /state_dump`  | `data`, `data_ts` and `cur_ts` for tests  |

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, patch, put};
use axum::{Json, Router};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::ApiError;
use crate::node::Node;
use crate::operation::Operation;
use crate::store::StateDump;

/// Header carrying the sender's node id on peer pushes. Informational only.
pub const NODE_ID_HEADER: &str = "x-node-id";

pub fn router(node: Node) -> Router {
    Router::new()
        .route("/change", patch(change))
        .route("/sync", put(sync))
        .route("/values", get(values))
        .route("/state_dump", get(state_dump))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

/// Serves `node` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, node: Node, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(node))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")
}

fn success() -> Json<Value> {
    Json(json!({ "status": "success" }))
}

/// Key/value pairs of a `/change` body, in the order they were sent.
struct ChangeBatch(Vec<(String, String)>);

impl<'de> Deserialize<'de> for ChangeBatch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BatchVisitor;

        impl<'de> Visitor<'de> for BatchVisitor {
            type Value = ChangeBatch;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping keys to string values")
            }

            fn visit_map<A>(self, mut map: A) -> Result<ChangeBatch, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(pair) = map.next_entry::<String, String>()? {
                    pairs.push(pair);
                }
                Ok(ChangeBatch(pairs))
            }
        }

        deserializer.deserialize_map(BatchVisitor)
    }
}

async fn change(State(node): State<Node>, body: Bytes) -> Result<Json<Value>, ApiError> {
    // Parse the whole body before touching state so a bad request mutates nothing.
    let ChangeBatch(pairs) = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidBody)?;
    let ops = node.change(pairs).await;
    debug!(node_id = node.id(), writes = ops.len(), "change applied");
    Ok(success())
}

async fn sync(
    State(node): State<Node>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let ops: Vec<Operation> = serde_json::from_slice(&body).map_err(ApiError::MalformedSync)?;
    let sender = headers
        .get(NODE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let report = node.sync(ops).await;
    debug!(
        node_id = node.id(),
        %sender,
        applied = report.applied,
        ignored = report.ignored,
        "sync handled"
    );
    Ok(success())
}

async fn values(State(node): State<Node>) -> Json<BTreeMap<String, String>> {
    Json(node.values().await)
}

async fn state_dump(State(node): State<Node>) -> Json<StateDump> {
    Json(node.state_dump().await)
}
