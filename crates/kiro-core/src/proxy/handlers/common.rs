//! Shared body parsing and response rendering for the dialect handlers.

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};

use kiro_types::error::{GatewayError, TranslationError};
use kiro_types::protocol::Dialect;

use crate::proxy::gateway::{ByteStream, GatewayResponse};

/// Bodies are parsed here rather than with the `Json` extractor so that a
/// bad body still gets the dialect's error envelope.
pub(super) fn parse_body(body: &Bytes) -> Result<Value, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|e| TranslationError::malformed(format!("request body is not valid JSON: {}", e)).into())
}

pub(super) fn render(dialect: Dialect, result: Result<GatewayResponse, GatewayError>) -> Response {
    match result {
        Ok(GatewayResponse::Json(body)) => Json(body).into_response(),
        Ok(GatewayResponse::Stream(stream)) => sse_response(stream),
        Err(e) => error_response(dialect, &e),
    }
}

fn sse_response(stream: ByteStream) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build SSE response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal streaming setup error").into_response()
        })
}

/// Error body in the shape clients of `dialect` expect.
pub fn error_response(dialect: Dialect, error: &GatewayError) -> Response {
    let status = StatusCode::from_u16(error.http_status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    if status.is_server_error() {
        tracing::warn!("{} request failed with {}: {}", dialect, status, error);
    } else {
        tracing::debug!("{} request rejected with {}: {}", dialect, status, error);
    }

    let body = match dialect {
        Dialect::Anthropic => json!({
            "type": "error",
            "error": {
                "type": error.anthropic_error_type(),
                "message": error.to_string(),
            },
        }),
        Dialect::OpenAI => json!({
            "error": {
                "message": error.to_string(),
                "type": error.openai_error_type(),
                "code": null,
            },
        }),
    };
    (status, Json(body)).into_response()
}
