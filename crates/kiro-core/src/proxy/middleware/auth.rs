use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::modules::config::ConfigHandle;

/// Path prefixes that require the client token.
const PROTECTED_PREFIXES: &[&str] = &["/v1/", "/api/"];

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "401" }))).into_response()
}

/// Client-token gate for `/v1` and `/api`.
///
/// The token is read from the current config snapshot on every request, so a
/// token saved through the settings API applies without a restart.
pub async fn auth_middleware(State(config): State<Arc<ConfigHandle>>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if request.method() == Method::OPTIONS || !is_protected(path) {
        return next.run(request).await;
    }

    let expected = config.snapshot().server.client_token.clone();
    if expected.is_empty() {
        tracing::error!("Client token is not configured; denying {}", path);
        return unauthorized();
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .or_else(|| request.headers().get("x-api-key").and_then(|h| h.to_str().ok()));

    if presented.is_some_and(|key| constant_time_compare(key.trim(), &expected)) {
        next.run(request).await
    } else {
        tracing::warn!("Rejected unauthenticated request: {} {}", request.method(), path);
        unauthorized()
    }
}
