use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::proxy::handlers;
use crate::proxy::middleware::auth_middleware;
use crate::proxy::Gateway;

/// Request bodies may carry base64 images.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Axum state for the `/v1` handlers
#[derive(Clone)]
pub struct ProxyState {
    pub gateway: Arc<Gateway>,
}

/// Public dialect routes behind the client-token gate.
///
/// Returned as `Router<()>` so the daemon can merge its admin routes in.
pub fn build_proxy_router(gateway: Arc<Gateway>) -> Router<()> {
    let config = Arc::clone(gateway.config());
    let state = ProxyState { gateway };

    Router::new()
        .route("/v1/models", get(handlers::models::handle_list_models))
        .route("/v1/messages", post(handlers::messages::handle_messages))
        .route("/v1/messages/count_tokens", post(handlers::messages::handle_count_tokens))
        .route("/v1/chat/completions", post(handlers::chat::handle_chat_completions))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
