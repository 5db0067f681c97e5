//! Bearer-token middleware shared by both routers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

/// Expected bearer credential plus the router's 401 body.
///
/// With no token configured every request is let through.
#[derive(Clone)]
pub struct BearerAuth {
    token: Option<Arc<str>>,
    reject: fn() -> Response,
}

impl BearerAuth {
    pub fn new(token: Option<String>, reject: fn() -> Response) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(Arc::from),
            reject,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn permits(&self, header: Option<&str>) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        header
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|presented| presented.trim() == expected.as_ref())
    }
}

pub async fn require_bearer(State(auth): State<BearerAuth>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if auth.permits(header) {
        return next.run(request).await;
    }
    warn!(path = %request.uri().path(), "unauthorized access attempt");
    (auth.reject)()
}
