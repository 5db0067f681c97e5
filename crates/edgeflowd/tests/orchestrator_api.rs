//! Orchestrator API tests.
//!
//! The full path runs a real edge router on a loopback port so the
//! orchestrator's HTTP deploy client pushes functions over the wire.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use edgeflow_api::{edge_router, orchestrator_router};
use edgeflow_host::{FunctionHost, HostConfig};
use edgeflow_placement::NodeRegistry;
use edgeflow_scheduler::{DeploymentCoordinator, HttpDeployClient, RetryPolicy};

const EDGE_TOKEN: &str = "edge-secret";

fn coordinator(token: Option<&str>) -> DeploymentCoordinator {
    let client = HttpDeployClient::new(token.map(str::to_string), Duration::from_secs(5));
    DeploymentCoordinator::new(NodeRegistry::new(), Arc::new(client)).with_retry_policy(RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(10),
    })
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serve an edge router on 127.0.0.1 and return its port.
async fn spawn_edge(dir: &TempDir) -> (u16, FunctionHost) {
    let host = FunctionHost::new(HostConfig::with_dir(dir.path()), None);
    let app = edge_router(host.clone(), Some(EDGE_TOKEN.to_string()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (port, host)
}

fn node(id: &str, port: u16) -> Value {
    json!({
        "id": id,
        "address": "127.0.0.1",
        "port": port,
        "resources": {"memory": 2048, "cpus": 2}
    })
}

fn echo_function() -> Value {
    json!({
        "id": "f1",
        "name": "echo",
        "code": "cat",
        "runtime": "shell",
        "requirements": {"memory": 512}
    })
}

async fn register(app: &Router, body: Value) {
    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/nodes", Some(body)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn list_nodes_empty() {
    let app = orchestrator_router(coordinator(None), None);
    let resp = app.oneshot(request("GET", "/api/v1/nodes", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["data"], json!([]));
}

#[tokio::test]
async fn api_token_is_enforced() {
    let app = orchestrator_router(coordinator(None), Some("ops".to_string()));
    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/tasks", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["error"], "Unauthorized");

    let req = Request::builder()
        .uri("/api/v1/tasks")
        .header("authorization", "Bearer ops")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn schedule_without_capacity_is_service_unavailable() {
    let app = orchestrator_router(coordinator(None), None);
    let mut small = node("small", 3000);
    small["resources"] = json!({"memory": 128, "cpus": 1});
    register(&app, small).await;

    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/functions", Some(echo_function())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let resp = app.oneshot(request("GET", "/api/v1/tasks", None)).await.unwrap();
    assert_eq!(json_body(resp).await["data"], json!([]));
}

#[tokio::test]
async fn overloaded_node_is_skipped() {
    let app = orchestrator_router(coordinator(None), None);
    register(&app, node("busy", 3000)).await;
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/nodes/busy/status",
            Some(json!({"currentLoad": 0.8})),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(request("POST", "/api/v1/functions", Some(echo_function())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let app = orchestrator_router(coordinator(None), None);
    let resp = app
        .oneshot(request("GET", "/api/v1/tasks/does-not-exist", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn schedule_deploys_to_edge_and_function_is_invocable() {
    let dir = TempDir::new().unwrap();
    let (port, host) = spawn_edge(&dir).await;

    let coordinator = coordinator(Some(EDGE_TOKEN));
    let app = orchestrator_router(coordinator.clone(), None);
    register(&app, node("edge-1", port)).await;

    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/functions", Some(echo_function())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let task_id = json_body(resp).await["data"]["taskId"]
        .as_str()
        .unwrap()
        .to_string();

    let task = coordinator.wait(&task_id).await.unwrap();
    assert_eq!(task.error, None);

    let resp = app
        .oneshot(request("GET", &format!("/api/v1/tasks/{task_id}"), None))
        .await
        .unwrap();
    let body = json_body(resp).await;
    assert_eq!(body["data"]["status"], "deployed");
    assert_eq!(body["data"]["retryCount"], 0);
    assert_eq!(body["data"]["targetNode"]["id"], "edge-1");

    let record = host.get("f1").await.unwrap();
    assert_eq!(record.task_id.as_deref(), Some(task_id.as_str()));
    let out = host.invoke("f1", json!({"x": 1})).await.unwrap();
    assert_eq!(out["x"], 1);
    assert_eq!(out["metadata"]["invocations"], 1);
}

#[tokio::test]
async fn edge_rejecting_credentials_ends_in_failed_task() {
    let dir = TempDir::new().unwrap();
    let (port, host) = spawn_edge(&dir).await;

    let coordinator = coordinator(Some("wrong-token"));
    let app = orchestrator_router(coordinator.clone(), None);
    register(&app, node("edge-1", port)).await;

    let resp = app
        .oneshot(request("POST", "/api/v1/functions", Some(echo_function())))
        .await
        .unwrap();
    let task_id = json_body(resp).await["data"]["taskId"]
        .as_str()
        .unwrap()
        .to_string();

    let task = coordinator.wait(&task_id).await.unwrap();
    assert_eq!(serde_json::to_value(task.status).unwrap(), "failed");
    assert_eq!(task.retry_count, 1);
    assert!(task.error.unwrap().contains("401"));
    assert!(host.get("f1").await.is_none());
}
