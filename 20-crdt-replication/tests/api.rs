//! HTTP contract tests, driving the router in-process with `oneshot`.

use anyhow::Result;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use crdt_replication::api::router;
use crdt_replication::config::ClusterConfig;
use crdt_replication::node::Node;

fn node(id: u64) -> Result<Node> {
    let cluster = ClusterConfig::parse("0 127.0.0.1 9000\n1 127.0.0.1 9001\n2 127.0.0.1 9002\n")?;
    Ok(Node::new(id, cluster))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<&str>,
) -> Result<(StatusCode, Value)> {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => Request::builder().method(method).uri(uri).body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, json))
}

#[tokio::test]
async fn change_then_read_back() -> Result<()> {
    let app = router(node(0)?);

    let (status, body) =
        call(&app, Method::PATCH, "/change", Some(r#"{"k":"v","k2":"v2"}"#)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let (status, values) = call(&app, Method::GET, "/values", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(values, json!({"k": "v", "k2": "v2"}));

    let (_, dump) = call(&app, Method::GET, "/state_dump", None).await?;
    assert_eq!(dump["data"], json!({"k": "v", "k2": "v2"}));
    assert_eq!(dump["cur_ts"], json!({"0": 2}));
    assert_eq!(dump["data_ts"]["k"], json!({"0": 1}));
    assert_eq!(dump["data_ts"]["k2"], json!({"0": 2}));
    Ok(())
}

#[tokio::test]
async fn empty_value_deletes_but_keeps_version() -> Result<()> {
    let app = router(node(1)?);

    call(&app, Method::PATCH, "/change", Some(r#"{"k2":"v2"}"#)).await?;
    let (status, _) = call(&app, Method::PATCH, "/change", Some(r#"{"k2":""}"#)).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, dump) = call(&app, Method::GET, "/state_dump", None).await?;
    assert_eq!(dump["data"], json!({}));
    assert_eq!(dump["data_ts"]["k2"], json!({"1": 2}));
    Ok(())
}

#[tokio::test]
async fn change_rejects_non_object_bodies() -> Result<()> {
    let app = router(node(0)?);

    for body in [r#"["k","v"]"#, r#""k""#, "42", "not json", r#"{"k": 1}"#] {
        let (status, reply) = call(&app, Method::PATCH, "/change", Some(body)).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
        assert_eq!(reply, json!({"error": "invalid body format"}));
    }

    // A bad value later in the object must not leave earlier keys applied.
    call(&app, Method::PATCH, "/change", Some(r#"{"a":"1","b":null}"#)).await?;

    let (_, dump) = call(&app, Method::GET, "/state_dump", None).await?;
    assert_eq!(dump["data"], json!({}));
    assert_eq!(dump["cur_ts"], json!({"0": 0}));
    Ok(())
}

#[tokio::test]
async fn sync_applies_peer_log_and_merges_clock() -> Result<()> {
    let app = router(node(2)?);
    let log = json!([
        {"key": "k", "value": "v0", "op_type": "set", "src": 0, "ts": {"0": 1}},
        {"key": "gone", "value": "x", "op_type": "set", "src": 1, "ts": {"1": 1}},
        {"key": "gone", "value": "", "op_type": "del", "src": 1, "ts": {"1": 2}}
    ])
    .to_string();

    for _ in 0..2 {
        let (status, body) = call(&app, Method::PUT, "/sync", Some(&log)).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "success"}));
    }

    let (_, dump) = call(&app, Method::GET, "/state_dump", None).await?;
    assert_eq!(dump["data"], json!({"k": "v0"}));
    assert_eq!(dump["data_ts"]["gone"], json!({"1": 2}));
    assert_eq!(dump["cur_ts"], json!({"0": 1, "1": 2, "2": 0}));
    Ok(())
}

#[tokio::test]
async fn malformed_sync_applies_nothing() -> Result<()> {
    let app = router(node(0)?);
    let log = json!([
        {"key": "k", "value": "v", "op_type": "set", "src": 1, "ts": {"1": 1}},
        {"key": "k", "value": "v", "op_type": "bogus", "src": 1, "ts": {"1": 2}}
    ])
    .to_string();

    let (status, body) = call(&app, Method::PUT, "/sync", Some(&log)).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    let (_, values) = call(&app, Method::GET, "/values", None).await?;
    assert_eq!(values, json!({}));
    Ok(())
}
