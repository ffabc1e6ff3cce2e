//! `/v1/messages` and `/v1/messages/count_tokens`

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use kiro_types::protocol::Dialect;

use super::common::{error_response, parse_body, render};
use crate::proxy::server::ProxyState;

pub async fn handle_messages(State(state): State<ProxyState>, body: Bytes) -> Response {
    let result = match parse_body(&body) {
        Ok(body) => state.gateway.handle(Dialect::Anthropic, &body).await,
        Err(e) => Err(e),
    };
    render(Dialect::Anthropic, result)
}

pub async fn handle_count_tokens(State(state): State<ProxyState>, body: Bytes) -> Response {
    match parse_body(&body).and_then(|body| state.gateway.count_tokens(Dialect::Anthropic, &body)) {
        Ok(input_tokens) => Json(json!({ "input_tokens": input_tokens })).into_response(),
        Err(e) => error_response(Dialect::Anthropic, &e),
    }
}
