use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kiro_types::models::{
    CredentialStatus, GatewayConfig, HeaderStrategy, Http2Mode, PoolConfig, StealthProfile, StoredCredential,
    UpstreamConfig,
};
use kiro_types::protocol::Dialect;

use super::{Gateway, GatewayResponse};
use crate::modules::config::ConfigHandle;
use crate::proxy::credential_pool::CredentialPool;
use crate::proxy::upstream::eventstream::{encode_event, encode_frame};
use crate::proxy::upstream::StealthTransport;

fn config(base_url: &str) -> GatewayConfig {
    GatewayConfig {
        stealth: StealthProfile { header_strategy: HeaderStrategy::Off, http2_mode: Http2Mode::ForceH1 },
        pool: PoolConfig { acquire_wait_ms: 50, ..PoolConfig::default() },
        upstream: UpstreamConfig { base_url: base_url.to_string(), ..UpstreamConfig::default() },
        ..GatewayConfig::default()
    }
}

fn gateway_with(config: GatewayConfig, ids: &[&str]) -> Gateway {
    let credentials = ids.iter().map(|id| StoredCredential::new(format!("tok-{id}")).with_id(*id)).collect();
    let pool = Arc::new(CredentialPool::load(credentials, config.pool.clone()).unwrap());
    let transport = Arc::new(StealthTransport::new(Duration::from_secs(5)));
    Gateway::new(pool, transport, Arc::new(ConfigHandle::new(config, None)))
}

fn anthropic_body(stream: bool) -> Value {
    json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 256,
        "stream": stream,
        "messages": [{"role": "user", "content": "Hi"}],
    })
}

fn hello_reply() -> Vec<u8> {
    let mut body = encode_event("assistantResponseEvent", &json!({"content": "Hello"}));
    body.extend(encode_event("assistantResponseEvent", &json!({"content": " there"})));
    body.extend(encode_event("messageStopEvent", &json!({})));
    body
}

async fn collect_text(response: GatewayResponse) -> String {
    let GatewayResponse::Stream(stream) = response else { panic!("expected a stream") };
    let frames: Vec<_> = stream.collect().await;
    frames.into_iter().map(|frame| String::from_utf8(frame.unwrap().to_vec()).unwrap()).collect()
}

fn throttled_reply() -> Vec<u8> {
    let mut body = encode_event("assistantResponseEvent", &json!({"content": "Hel"}));
    body.extend(encode_frame(
        &[(":message-type", "exception"), (":exception-type", "ThrottlingException")],
        json!({"message": "Too many requests"}).to_string().as_bytes(),
    ));
    body
}

fn failure_count(gateway: &Gateway, id: &str) -> u32 {
    gateway.pool().snapshot().into_iter().find(|view| view.id == id).unwrap().failure_count
}

#[tokio::test]
async fn test_non_stream_reply_is_rendered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a"]);
    let response = gateway.handle(Dialect::Anthropic, &anthropic_body(false)).await.unwrap();

    let GatewayResponse::Json(body) = response else { panic!("expected JSON") };
    assert_eq!(body["type"], "message");
    assert_eq!(body["content"][0]["text"], "Hello there");
    assert_eq!(body["stop_reason"], "end_turn");
    assert!(body["id"].as_str().unwrap().starts_with("msg_"));

    let view = &gateway.pool().snapshot()[0];
    assert_eq!(view.in_flight, 0);
    assert!(view.last_used_at.is_some());
}

#[tokio::test]
async fn test_retries_on_a_different_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer tok-a"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer tok-b"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a", "b"]);
    let response = gateway.handle(Dialect::Anthropic, &anthropic_body(false)).await.unwrap();

    assert!(matches!(response, GatewayResponse::Json(_)));
    assert_eq!(failure_count(&gateway, "a"), 1);
    assert_eq!(failure_count(&gateway, "b"), 0);
}

#[tokio::test]
async fn test_in_band_throttling_moves_to_another_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer tok-a"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(throttled_reply()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer tok-b"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a", "b"]);
    let response = gateway.handle(Dialect::Anthropic, &anthropic_body(false)).await.unwrap();

    let GatewayResponse::Json(body) = response else { panic!("expected JSON") };
    assert_eq!(body["content"][0]["text"], "Hello there");

    let snapshot = gateway.pool().snapshot();
    assert_eq!(snapshot[0].status, CredentialStatus::CoolingDown);
    assert_eq!(snapshot[0].failure_count, 1);
    assert!(snapshot.iter().all(|view| view.in_flight == 0));
}

#[tokio::test]
async fn test_in_band_throttling_on_last_attempt_is_429() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(throttled_reply()))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a"]);
    let err = gateway.handle(Dialect::Anthropic, &anthropic_body(false)).await.err().unwrap();

    assert_eq!(err.http_status_code(), 429);
    assert_eq!(gateway.pool().snapshot()[0].in_flight, 0);
}

#[tokio::test]
async fn test_slow_credential_gives_way_before_the_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer tok-a"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer tok-b"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with(GatewayConfig { request_timeout_secs: 2, ..config(&server.uri()) }, &["a", "b"]);
    let response = gateway.handle(Dialect::Anthropic, &anthropic_body(false)).await.unwrap();

    assert!(matches!(response, GatewayResponse::Json(_)));
    assert_eq!(failure_count(&gateway, "a"), 1);
    assert_eq!(failure_count(&gateway, "b"), 0);
}

#[tokio::test]
async fn test_auth_failure_invalidates_and_rotates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer tok-a"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer tok-b"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()))
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a", "b"]);
    gateway.handle(Dialect::Anthropic, &anthropic_body(false)).await.unwrap();

    let snapshot = gateway.pool().snapshot();
    assert_eq!(snapshot[0].status, CredentialStatus::Invalid);
    assert_eq!(snapshot[1].status, CredentialStatus::Active);
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a", "b", "c"]);
    let err = gateway.handle(Dialect::Anthropic, &anthropic_body(false)).await.err().unwrap();

    assert_eq!(err.http_status_code(), 502);
    assert_eq!(failure_count(&gateway, "c"), 0);
}

#[tokio::test]
async fn test_client_errors_pass_through_without_penalty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad conversation"))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a", "b"]);
    let err = gateway.handle(Dialect::OpenAI, &json!({
        "model": "claude-sonnet-4-20250514",
        "messages": [{"role": "user", "content": "Hi"}],
    }))
    .await
    .err()
    .unwrap();

    assert_eq!(err.http_status_code(), 400);
    assert_eq!(err.openai_error_type(), "invalid_request_error");
    assert_eq!(failure_count(&gateway, "a"), 0);
}

#[tokio::test]
async fn test_exhausted_pool_is_503() {
    let server = MockServer::start().await;
    let gateway = gateway_with(config(&server.uri()), &["a"]);
    gateway.pool().toggle("a", false).unwrap();

    let err = gateway.handle(Dialect::Anthropic, &anthropic_body(false)).await.err().unwrap();

    assert_eq!(err.http_status_code(), 503);
    assert_eq!(err.anthropic_error_type(), "overloaded_error");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_translation_errors_never_reach_upstream() {
    let server = MockServer::start().await;
    let gateway = gateway_with(config(&server.uri()), &["a"]);

    let unknown_model = json!({"model": "gpt-4o", "max_tokens": 10, "messages": [{"role": "user", "content": "Hi"}]});
    let err = gateway.handle(Dialect::Anthropic, &unknown_model).await.err().unwrap();
    assert_eq!(err.http_status_code(), 400);

    let no_messages = json!({"model": "claude-sonnet-4-20250514", "max_tokens": 10, "messages": []});
    let err = gateway.handle(Dialect::Anthropic, &no_messages).await.err().unwrap();
    assert_eq!(err.http_status_code(), 400);

    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(gateway.pool().snapshot()[0].in_flight, 0);
}

#[tokio::test]
async fn test_stream_relay_holds_lease_until_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()))
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a"]);
    let response = gateway.handle(Dialect::Anthropic, &anthropic_body(true)).await.unwrap();
    assert_eq!(gateway.pool().snapshot()[0].in_flight, 1);

    let text = collect_text(response).await;
    assert!(text.starts_with("event: message_start\n"));
    assert!(text.contains("\"text\":\"Hello\""));
    assert!(text.contains("\"stop_reason\":\"end_turn\""));
    assert!(text.trim_end().rsplit("\n\n").next().unwrap().starts_with("event: message_stop"));
    assert!(!text.contains("event: error"));

    let view = &gateway.pool().snapshot()[0];
    assert_eq!(view.in_flight, 0);
    assert_eq!(view.failure_count, 0);
}

#[tokio::test]
async fn test_client_disconnect_mid_stream_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()))
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a"]);
    let response = gateway.handle(Dialect::Anthropic, &anthropic_body(true)).await.unwrap();
    let GatewayResponse::Stream(mut stream) = response else { panic!("expected a stream") };

    let first = stream.next().await.unwrap().unwrap();
    assert!(first.starts_with(b"event: message_start"));
    drop(stream);

    let view = &gateway.pool().snapshot()[0];
    assert_eq!(view.in_flight, 0);
    assert_eq!(view.failure_count, 1);
}

#[tokio::test]
async fn test_client_disconnect_after_stop_frame_counts_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()))
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a"]);
    let response = gateway.handle(Dialect::Anthropic, &anthropic_body(true)).await.unwrap();
    let GatewayResponse::Stream(mut stream) = response else { panic!("expected a stream") };

    // Stop reading as soon as the stop frame arrives, before the relay winds down
    while let Some(frame) = stream.next().await {
        if frame.unwrap().starts_with(b"event: message_stop") {
            break;
        }
    }
    drop(stream);

    let view = &gateway.pool().snapshot()[0];
    assert_eq!(view.in_flight, 0);
    assert_eq!(view.failure_count, 0);
}

#[tokio::test]
async fn test_truncated_stream_ends_with_error_and_stop() {
    let server = MockServer::start().await;
    let mut body = encode_event("assistantResponseEvent", &json!({"content": "Hel"}));
    let tail = encode_event("assistantResponseEvent", &json!({"content": "lo"}));
    body.extend_from_slice(&tail[..tail.len() / 2]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let gateway = gateway_with(config(&server.uri()), &["a"]);
    let request = json!({
        "model": "claude-sonnet-4-20250514",
        "stream": true,
        "messages": [{"role": "user", "content": "Hi"}],
    });
    let response = gateway.handle(Dialect::OpenAI, &request).await.unwrap();
    let text = collect_text(response).await;

    assert!(text.contains("\"content\":\"Hel\""));
    assert!(text.contains("\"error\""));
    assert!(text.trim_end().ends_with("data: [DONE]"));

    let view = &gateway.pool().snapshot()[0];
    assert_eq!(view.in_flight, 0);
    assert_eq!(view.failure_count, 1);
}

#[tokio::test]
async fn test_deadline_bounds_the_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(hello_reply()).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let gateway = gateway_with(GatewayConfig { request_timeout_secs: 1, ..config(&server.uri()) }, &["a"]);
    let err = gateway.handle(Dialect::Anthropic, &anthropic_body(false)).await.err().unwrap();

    assert_eq!(err.http_status_code(), 504);
    let view = &gateway.pool().snapshot()[0];
    assert_eq!(view.in_flight, 0);
    assert_eq!(view.failure_count, 1);
}

#[test]
fn test_count_tokens_needs_no_credential() {
    let gateway = gateway_with(config("http://127.0.0.1:9"), &["a"]);
    let tokens = gateway
        .count_tokens(Dialect::Anthropic, &json!({
            "model": "claude-sonnet-4-20250514",
            "messages": [{"role": "user", "content": "How many tokens is this sentence?"}],
        }))
        .unwrap();
    assert!(tokens > 0);
    assert!(gateway.count_tokens(Dialect::Anthropic, &json!("nope")).is_err());
}
