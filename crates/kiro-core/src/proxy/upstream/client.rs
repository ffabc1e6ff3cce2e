//! Stealth HTTP transport to the upstream endpoint.

use std::time::Duration;

use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use url::Url;

use kiro_types::error::UpstreamError;
use kiro_types::models::{HeaderStrategy, Http2Mode, StealthProfile};

use super::eventstream::{decode_events, UpstreamEventStream};
use super::stealth::build_headers;
use crate::proxy::mappers::codewhisperer::GenerateAssistantRequest;
use crate::utils::redact::mask_secret;

const GENERATE_PATH: &str = "generateAssistantResponse";
const MAX_ERROR_BODY_CHARS: usize = 2000;

/// The credential presented on one call.
#[derive(Clone, Copy)]
pub struct CallCredential<'a> {
    pub id: &'a str,
    pub secret: &'a str,
}

/// A successful (2xx) upstream reply with its body still unread.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub events: UpstreamEventStream,
}

/// `{base}/generateAssistantResponse`, tolerating a missing trailing slash.
pub fn endpoint_url(base_url: &str) -> Result<Url, UpstreamError> {
    let base = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|url| url.join(GENERATE_PATH))
        .map_err(|e| UpstreamError::Network { message: format!("invalid upstream URL '{}': {}", base_url, e) })
}

/// Sends upstream calls shaped by a [`StealthProfile`].
///
/// One `reqwest::Client` per profile, built on first use; a client carries
/// the HTTP version policy and header casing, so it cannot be shared across
/// profiles.
pub struct StealthTransport {
    clients: DashMap<StealthProfile, Client>,
    connect_timeout: Duration,
}

impl StealthTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { clients: DashMap::new(), connect_timeout }
    }

    fn client_for(&self, profile: StealthProfile) -> Result<Client, UpstreamError> {
        if let Some(client) = self.clients.get(&profile) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder().connect_timeout(self.connect_timeout);
        builder = match profile.http2_mode {
            Http2Mode::Auto => builder,
            Http2Mode::ForceH1 => builder.http1_only(),
            Http2Mode::ForceH2 => builder.http2_prior_knowledge(),
        };
        if profile.header_strategy == HeaderStrategy::RealSimulation && profile.http2_mode != Http2Mode::ForceH2 {
            builder = builder.http1_title_case_headers();
        }
        let client = builder
            .build()
            .map_err(|e| UpstreamError::Network { message: format!("failed to build HTTP client: {}", e) })?;

        tracing::debug!(
            "Built upstream client | headers: {} | http: {}",
            profile.header_strategy,
            profile.http2_mode
        );
        Ok(self.clients.entry(profile).or_insert(client).clone())
    }

    /// One upstream call. Non-2xx statuses come back as [`UpstreamError::Status`];
    /// there are no retries at this layer.
    pub async fn send(
        &self,
        endpoint: &Url,
        profile: StealthProfile,
        credential: CallCredential<'_>,
        request: &GenerateAssistantRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let client = self.client_for(profile)?;

        let mut headers = HeaderMap::new();
        for (name, value) in build_headers(profile.header_strategy, credential.id, credential.secret) {
            let value = HeaderValue::from_str(&value).map_err(|_| UpstreamError::Network {
                message: format!("credential {} produced an invalid {} header", credential.id, name),
            })?;
            headers.insert(HeaderName::from_static(name), value);
        }

        tracing::debug!(
            "Upstream call | credential: {} ({}) | {}",
            credential.id,
            mask_secret(credential.secret),
            endpoint
        );

        let response = client
            .post(endpoint.clone())
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| UpstreamError::Network { message: e.without_url().to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            tracing::warn!("Upstream returned {} for credential {}", status, credential.id);
            return Err(UpstreamError::Status { status: status.as_u16(), body });
        }

        let headers = response.headers().clone();
        Ok(UpstreamResponse { status, headers, events: decode_events(response.bytes_stream()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mappers::codewhisperer::{build_upstream_request, UpstreamEvent, UpstreamOptions};
    use crate::proxy::upstream::eventstream::encode_event;
    use futures::StreamExt;
    use kiro_types::protocol::{CanonicalRequest, ContentBlock, Message};
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerateAssistantRequest {
        let canonical =
            CanonicalRequest::new("claude-sonnet-4-20250514", vec![Message::user(vec![ContentBlock::text("Hi")])]);
        let options = UpstreamOptions {
            conversation_id: "c1".to_string(),
            profile_arn: None,
            max_tool_description_length: 100,
        };
        build_upstream_request(&canonical, &options).unwrap()
    }

    fn profile(header_strategy: HeaderStrategy) -> StealthProfile {
        StealthProfile { header_strategy, http2_mode: Http2Mode::ForceH1 }
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("https://codewhisperer.us-east-1.amazonaws.com").unwrap().as_str(),
            "https://codewhisperer.us-east-1.amazonaws.com/generateAssistantResponse"
        );
        assert_eq!(
            endpoint_url("http://127.0.0.1:9000/prefix/").unwrap().as_str(),
            "http://127.0.0.1:9000/prefix/generateAssistantResponse"
        );
        assert!(endpoint_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_streams_decoded_events() {
        let server = MockServer::start().await;
        let mut body = encode_event("assistantResponseEvent", &json!({"content": "Hello"}));
        body.extend(encode_event("messageStopEvent", &json!({})));
        Mock::given(method("POST"))
            .and(path("/generateAssistantResponse"))
            .and(header("authorization", "Bearer secret-1"))
            .and(header("x-amzn-kiro-agent-mode", "vibe"))
            .and(header_exists("amz-sdk-invocation-id"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/vnd.amazon.eventstream")
                    .set_body_bytes(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = StealthTransport::new(Duration::from_secs(5));
        let endpoint = endpoint_url(&server.uri()).unwrap();
        let response = transport
            .send(
                &endpoint,
                profile(HeaderStrategy::RealSimulation),
                CallCredential { id: "cred-1", secret: "secret-1" },
                &request(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        let events: Vec<_> = response.events.collect().await;
        assert_eq!(
            events,
            vec![
                Ok(UpstreamEvent::AssistantText("Hello".to_string())),
                Ok(UpstreamEvent::MessageStop),
                Ok(UpstreamEvent::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_status_is_returned_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("x".repeat(5000)))
            .mount(&server)
            .await;

        let transport = StealthTransport::new(Duration::from_secs(5));
        let endpoint = endpoint_url(&server.uri()).unwrap();
        let err = transport
            .send(&endpoint, profile(HeaderStrategy::Off), CallCredential { id: "c", secret: "s" }, &request())
            .await
            .err()
            .unwrap();

        let UpstreamError::Status { status, body } = err else { panic!("expected status error") };
        assert_eq!(status, 429);
        assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
    }

    #[tokio::test]
    async fn test_off_strategy_sends_no_ide_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::<u8>::new()))
            .mount(&server)
            .await;

        let transport = StealthTransport::new(Duration::from_secs(5));
        let endpoint = endpoint_url(&server.uri()).unwrap();
        transport
            .send(&endpoint, profile(HeaderStrategy::Off), CallCredential { id: "c", secret: "s" }, &request())
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].headers.contains_key("x-amzn-kiro-agent-mode"));
        assert_eq!(received[0].headers.get("authorization").unwrap(), "Bearer s");
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["conversationState"]["currentMessage"]["userInputMessage"]["content"], "Hi");
    }

    #[tokio::test]
    async fn test_clients_are_cached_per_profile() {
        let transport = StealthTransport::new(Duration::from_secs(5));
        transport.client_for(profile(HeaderStrategy::Off)).unwrap();
        transport.client_for(profile(HeaderStrategy::Off)).unwrap();
        transport.client_for(profile(HeaderStrategy::RealSimulation)).unwrap();
        assert_eq!(transport.clients.len(), 2);
    }
}
