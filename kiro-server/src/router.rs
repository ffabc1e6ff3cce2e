use axum::{http::StatusCode, middleware, response::IntoResponse, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::AppState;
use kiro_core::proxy::build_proxy_router;
use kiro_core::proxy::middleware::{auth_middleware, cors::cors_layer};

pub fn build_router(state: AppState) -> Router {
    let proxy_router = build_proxy_router(state.gateway().clone());

    let protected_api = Router::<AppState>::new()
        .nest("/api", api::router())
        .layer(middleware::from_fn_with_state(state.config().clone(), auth_middleware));

    let public_routes = Router::<AppState>::new().route("/health", get(health_check));

    // Resolve AppState first so we get Router<()>, then merge the proxy
    // router, which carries its own auth gate and trace layer.
    protected_api
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(proxy_router)
        .layer(cors_layer())
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
