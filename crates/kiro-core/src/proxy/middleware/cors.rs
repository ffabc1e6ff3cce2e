use std::time::Duration;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Dashboard origins. API clients never send preflights, so they are unaffected.
const DASHBOARD_ORIGINS: [&str; 2] = ["http://localhost:8080", "http://127.0.0.1:8080"];
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(3600);

pub fn cors_layer() -> CorsLayer {
    let origins = DASHBOARD_ORIGINS.map(HeaderValue::from_static);

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(PREFLIGHT_MAX_AGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};
    use axum::{routing::get, Router};
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_preflight_from_dashboard_origin() {
        let app = Router::new().route("/api/tokens", get(|| async { "ok" })).layer(cors_layer());
        let server = TestServer::new(app).unwrap();

        let response = server
            .method(Method::OPTIONS, "/api/tokens")
            .add_header(HeaderName::from_static("origin"), HeaderValue::from_static("http://localhost:8080"))
            .add_header(
                HeaderName::from_static("access-control-request-method"),
                HeaderValue::from_static("POST"),
            )
            .await;

        assert_eq!(response.header("access-control-allow-origin"), "http://localhost:8080");
    }
}
