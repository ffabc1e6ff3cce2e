use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;

use kiro_types::protocol::Dialect;

use super::common::{parse_body, render};
use crate::proxy::server::ProxyState;

/// `/v1/chat/completions`
pub async fn handle_chat_completions(State(state): State<ProxyState>, body: Bytes) -> Response {
    let result = match parse_body(&body) {
        Ok(body) => state.gateway.handle(Dialect::OpenAI, &body).await,
        Err(e) => Err(e),
    };
    render(Dialect::OpenAI, result)
}
