//! Orchestrator handlers: node registry, function scheduling, task status.
//!
//! Each handler talks to the `DeploymentCoordinator` (and its registry) and
//! returns the `{success, data, error}` envelope.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::info;

use edgeflow_core::{EdgeNode, FunctionSpec};
use edgeflow_placement::StatusUpdate;
use edgeflow_scheduler::{DeploymentCoordinator, SchedulerError};

/// Shared state for orchestrator handlers.
#[derive(Clone)]
pub struct OrchestratorState {
    pub coordinator: DeploymentCoordinator,
}

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

pub(crate) fn unauthorized() -> Response {
    error_response("Unauthorized", StatusCode::UNAUTHORIZED)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Scheduled {
    task_id: String,
}

// ── Nodes ──────────────────────────────────────────────────────

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<OrchestratorState>) -> Response {
    ApiResponse::ok(state.coordinator.registry().snapshot().await).into_response()
}

/// POST /api/v1/nodes
pub async fn register_node(
    State(state): State<OrchestratorState>,
    body: Result<Json<EdgeNode>, JsonRejection>,
) -> Response {
    let Json(node) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST),
    };
    state.coordinator.registry().register(node.clone()).await;
    (StatusCode::CREATED, ApiResponse::ok(node)).into_response()
}

/// POST /api/v1/nodes/{id}/status
pub async fn update_node_status(
    State(state): State<OrchestratorState>,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Response {
    let Json(update) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST),
    };
    let registry = state.coordinator.registry();
    if !registry.update_status(&id, update).await {
        return error_response("node not found", StatusCode::NOT_FOUND);
    }
    match registry.get(&id).await {
        Some(snapshot) => ApiResponse::ok(snapshot).into_response(),
        None => error_response("node not found", StatusCode::NOT_FOUND),
    }
}

// ── Functions and tasks ────────────────────────────────────────

/// POST /api/v1/functions
pub async fn schedule_function(
    State(state): State<OrchestratorState>,
    body: Result<Json<FunctionSpec>, JsonRejection>,
) -> Response {
    let Json(spec) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST),
    };
    match state.coordinator.schedule_function(spec).await {
        Ok(task_id) => {
            info!(%task_id, "accepted function for deployment");
            (StatusCode::ACCEPTED, ApiResponse::ok(Scheduled { task_id })).into_response()
        }
        Err(e @ SchedulerError::NoCapacity(_)) => {
            error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// GET /api/v1/tasks
pub async fn list_tasks(State(state): State<OrchestratorState>) -> Response {
    ApiResponse::ok(state.coordinator.list_tasks().await).into_response()
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(State(state): State<OrchestratorState>, Path(id): Path<String>) -> Response {
    match state.coordinator.get_task_status(&id).await {
        Some(task) => ApiResponse::ok(task).into_response(),
        None => error_response("task not found", StatusCode::NOT_FOUND),
    }
}
