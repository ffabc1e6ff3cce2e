//! Per-request orchestration: normalize, lease, send, relay or collect, release.

mod relay;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use tokio::time::{timeout_at, Instant};

use kiro_types::error::{GatewayError, PoolError, UpstreamError};
use kiro_types::models::{GatewayConfig, ReleaseOutcome};
use kiro_types::protocol::{CanonicalResponse, Dialect};

use super::credential_pool::{CredentialLease, CredentialPool};
use super::mappers::codewhisperer::{build_upstream_request, CanonicalStreamBuilder, GenerateAssistantRequest, UpstreamOptions};
use super::mappers::streaming::EncoderContext;
use super::mappers::{collect_response, count_tokens, denormalize, normalize, tokens};
use super::upstream::{endpoint_url, CallCredential, StealthTransport, UpstreamResponse};
use crate::modules::config::ConfigHandle;

pub use relay::outcome_for_error_type;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

pub enum GatewayResponse {
    /// Complete response body
    Json(Value),
    /// SSE frames, produced lazily as the upstream answers
    Stream(ByteStream),
}

/// How the client wants the reply, and the ids it will carry.
struct ReplyShape {
    stream: bool,
    message_id: String,
    model: String,
    input_tokens: u32,
    created: i64,
}

impl ReplyShape {
    fn builder(&self) -> CanonicalStreamBuilder {
        CanonicalStreamBuilder::new(self.message_id.clone(), self.model.clone(), self.input_tokens)
    }
}

/// What a successful attempt produced.
enum Delivery {
    /// The lease travels with the relay until the stream ends
    Stream(CredentialLease, UpstreamResponse),
    /// Already collected; the lease has been released
    Complete(CanonicalResponse),
}

pub struct Gateway {
    pool: Arc<CredentialPool>,
    transport: Arc<StealthTransport>,
    config: Arc<ConfigHandle>,
}

impl Gateway {
    pub fn new(pool: Arc<CredentialPool>, transport: Arc<StealthTransport>, config: Arc<ConfigHandle>) -> Self {
        Self { pool, transport, config }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }

    /// Serve one inbound request in `dialect`.
    pub async fn handle(&self, dialect: Dialect, body: &Value) -> Result<GatewayResponse, GatewayError> {
        let config = self.config.snapshot();
        let deadline = Instant::now() + Duration::from_secs(config.request_timeout_secs);

        let normalized = normalize(dialect, body)?;
        let request = normalized.request;
        let upstream_request = build_upstream_request(
            &request,
            &UpstreamOptions {
                conversation_id: uuid::Uuid::new_v4().to_string(),
                profile_arn: config.upstream.profile_arn.as_deref(),
                max_tool_description_length: config.max_tool_description_length,
            },
        )?;

        let input_tokens = tokens::estimate_request_tokens(&request);
        let reply = ReplyShape {
            stream: request.stream,
            message_id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: request.model.clone(),
            input_tokens,
            created: chrono::Utc::now().timestamp(),
        };

        tracing::info!(
            "[{}] {} request | model: {} | stream: {} | messages: {}",
            reply.message_id,
            dialect,
            request.model,
            request.stream,
            request.messages.len()
        );

        match self.deliver(&config, &upstream_request, &reply, deadline).await? {
            Delivery::Stream(lease, response) => {
                let context = EncoderContext { created: reply.created, include_usage: request.stream_usage };
                Ok(GatewayResponse::Stream(relay::relay_stream(
                    dialect,
                    response.events,
                    reply.builder(),
                    lease,
                    context,
                    deadline,
                )))
            },
            Delivery::Complete(response) => Ok(GatewayResponse::Json(denormalize(dialect, &response))),
        }
    }

    /// Prompt token estimate for a request body, without calling upstream.
    pub fn count_tokens(&self, dialect: Dialect, body: &Value) -> Result<u32, GatewayError> {
        Ok(count_tokens(dialect, body)?)
    }

    /// Run the upstream call with up to `max_retries` retries, each on a
    /// credential not tried yet.
    ///
    /// Until the deadline's last attempt, each attempt waits at most an even
    /// share of the remaining time for upstream to answer; running out of that
    /// share is a retryable [`UpstreamError::Timeout`]. Buffered replies are
    /// collected inside the attempt, so an in-band exception can still move
    /// to another credential. Streaming replies are handed over as soon as the
    /// upstream answers.
    async fn deliver(
        &self,
        config: &GatewayConfig,
        request: &GenerateAssistantRequest,
        reply: &ReplyShape,
        deadline: Instant,
    ) -> Result<Delivery, GatewayError> {
        let endpoint = endpoint_url(&config.upstream.base_url)?;
        let deadline_expired = || GatewayError::Timeout { duration_secs: config.request_timeout_secs };
        let mut tried = HashSet::new();
        let mut last_error: Option<UpstreamError> = None;

        for attempt in 0..=config.max_retries {
            let lease = if attempt == 0 {
                self.pool.acquire(&reply.model).await?
            } else {
                match self.pool.acquire_excluding(&reply.model, &tried).await {
                    Ok(lease) => lease,
                    Err(e) => {
                        tracing::warn!("No other credential to retry on: {}", e);
                        break;
                    },
                }
            };
            tried.insert(lease.id().to_string());

            let now = Instant::now();
            let budget = deadline.saturating_duration_since(now) / (config.max_retries - attempt + 1);
            let attempt_deadline = now + budget;

            let credential = CallCredential { id: lease.id(), secret: lease.secret() };
            let sent =
                timeout_at(attempt_deadline, self.transport.send(&endpoint, config.stealth, credential, request)).await;

            let error = match sent {
                Err(_) if attempt_deadline >= deadline => {
                    lease.release(ReleaseOutcome::ServerError);
                    return Err(deadline_expired());
                },
                Err(_) => UpstreamError::Timeout { duration_secs: budget.as_secs_f64().ceil() as u64 },
                Ok(Err(e)) => e,
                Ok(Ok(response)) if reply.stream => {
                    if attempt > 0 {
                        tracing::info!("Upstream retry succeeded on credential {}", lease.id());
                    }
                    return Ok(Delivery::Stream(lease, response));
                },
                Ok(Ok(response)) => {
                    match timeout_at(deadline, collect_response(response.events, reply.builder(), reply.created)).await {
                        Err(_) => {
                            lease.release(ReleaseOutcome::ServerError);
                            return Err(deadline_expired());
                        },
                        Ok(Ok(collected)) => {
                            if attempt > 0 {
                                tracing::info!("Upstream retry succeeded on credential {}", lease.id());
                            }
                            lease.release(ReleaseOutcome::Success);
                            return Ok(Delivery::Complete(collected));
                        },
                        Ok(Err(e)) => e,
                    }
                },
            };

            let outcome = error.release_outcome();
            tracing::warn!(
                "Upstream call failed | credential: {} | outcome: {} | attempt: {}/{} | {}",
                lease.id(),
                outcome,
                attempt + 1,
                config.max_retries + 1,
                error
            );
            lease.release(outcome);
            if !error.is_retryable() {
                return Err(error.into());
            }
            last_error = Some(error);
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => PoolError::Exhausted { waited_ms: 0 }.into(),
        })
    }
}
