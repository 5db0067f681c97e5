//! Edge node handlers: deploy, invoke, health.
//!
//! Bodies follow the edge wire format: `{status, functionId}` on deploy,
//! the function's own result on invoke, `{error}` on any failure.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::{Value, json};
use tracing::{error, warn};

use edgeflow_core::DeployRequest;
use edgeflow_host::{FunctionHost, HostError};

/// Shared state for edge handlers.
#[derive(Clone)]
pub struct EdgeState {
    pub host: FunctionHost,
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

pub(crate) fn unauthorized() -> Response {
    error_response("Unauthorized", StatusCode::UNAUTHORIZED)
}

fn host_error(e: &HostError) -> Response {
    match e {
        HostError::NotFound(_) => error_response("Function not found", StatusCode::NOT_FOUND),
        e if e.is_client_error() => error_response(&e.to_string(), StatusCode::BAD_REQUEST),
        e => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// POST /deploy
pub async fn deploy(
    State(state): State<EdgeState>,
    body: Result<Json<DeployRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(&rejection.body_text(), StatusCode::BAD_REQUEST),
    };
    let function_id = request.id.clone();
    match state.host.deploy(request).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "status": "deployed", "functionId": function_id })),
        )
            .into_response(),
        Err(e) => {
            error!(%function_id, error = %e, "deployment failed");
            host_error(&e)
        }
    }
}

/// POST /invoke/{id}
///
/// An empty body invokes the function with `{}`.
pub async fn invoke(State(state): State<EdgeState>, Path(id): Path<String>, body: Bytes) -> Response {
    let input: Value = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(input) => input,
            Err(e) => return error_response(&format!("invalid JSON body: {e}"), StatusCode::BAD_REQUEST),
        }
    };

    match state.host.invoke(&id, input).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            if matches!(e, HostError::NotFound(_)) {
                warn!(function_id = %id, "function not found");
            }
            host_error(&e)
        }
    }
}

/// GET /health
pub async fn health(State(state): State<EdgeState>) -> impl IntoResponse {
    Json(state.host.health().await)
}
