//! edgeflow-api — REST API for edge nodes and the orchestrator.
//!
//! # Edge node routes
//!
//! | Method | Path | Auth | Description |
//! |---|---|---|---|
//! | POST | `/deploy` | bearer | Store a function body |
//! | POST | `/invoke/{id}` | bearer | Run a function on the JSON body |
//! | GET | `/health` | none | Liveness and function count |
//!
//! # Orchestrator routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/nodes` | List nodes with status |
//! | POST | `/api/v1/nodes` | Register a node |
//! | POST | `/api/v1/nodes/{id}/status` | Merge a status report |
//! | POST | `/api/v1/functions` | Schedule a function, returns a task id |
//! | GET | `/api/v1/tasks` | List tasks in acceptance order |
//! | GET | `/api/v1/tasks/{id}` | Get one task |

pub mod auth;
pub mod edge;
pub mod orchestrator;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::warn;

use edgeflow_host::FunctionHost;
use edgeflow_scheduler::DeploymentCoordinator;

pub use auth::BearerAuth;
pub use edge::EdgeState;
pub use orchestrator::OrchestratorState;

/// Build the edge node router. `/health` is never authenticated.
pub fn edge_router(host: FunctionHost, auth_token: Option<String>) -> Router {
    let bearer = BearerAuth::new(auth_token, edge::unauthorized);
    if !bearer.is_enabled() {
        warn!("no auth token configured, deploy and invoke are open");
    }
    let state = EdgeState { host };

    Router::new()
        .route("/deploy", post(edge::deploy))
        .route("/invoke/{id}", post(edge::invoke))
        .route_layer(middleware::from_fn_with_state(bearer, auth::require_bearer))
        .route("/health", get(edge::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the orchestrator router, nested under `/api/v1`.
pub fn orchestrator_router(coordinator: DeploymentCoordinator, api_token: Option<String>) -> Router {
    let bearer = BearerAuth::new(api_token, orchestrator::unauthorized);
    let state = OrchestratorState { coordinator };

    let api_routes = Router::new()
        .route("/nodes", get(orchestrator::list_nodes).post(orchestrator::register_node))
        .route("/nodes/{id}/status", post(orchestrator::update_node_status))
        .route("/functions", post(orchestrator::schedule_function))
        .route("/tasks", get(orchestrator::list_tasks))
        .route("/tasks/{id}", get(orchestrator::get_task))
        .route_layer(middleware::from_fn_with_state(bearer, auth::require_bearer))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
}
