// Mappers module - protocol converters
// anthropic / openai <-> canonical <-> codewhisperer

pub mod anthropic;
pub mod codewhisperer;
pub mod collector;
pub mod model_mapping;
pub mod openai;
pub mod streaming;
pub mod tokens;

use base64::Engine;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::time::Instant;

use kiro_types::error::{TranslationError, UpstreamError};
use kiro_types::protocol::{CanonicalRequest, CanonicalResponse, Dialect, StreamEvent};

use crate::proxy::upstream::UpstreamEventStream;
use codewhisperer::{stream_error_type, CanonicalStreamBuilder};
use streaming::{encoder_for, EncoderContext};

pub use collector::{collect_response, ResponseCollector};
pub use model_mapping::{list_models, resolve_upstream_model};

/// A normalized request plus the fields that were dropped on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub request: CanonicalRequest,
    pub warnings: Vec<String>,
}

pub(crate) fn record_warning(warnings: &mut Vec<String>, message: String) {
    tracing::warn!("{}", message);
    warnings.push(message);
}

/// Reject image payloads that are not valid base64.
pub(crate) fn decode_base64_image(data: &str, path: &str) -> Result<(), TranslationError> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map(|_| ())
        .map_err(|e| TranslationError::malformed(format!("{}: image data is not valid base64: {}", path, e)))
}

pub fn normalize(dialect: Dialect, raw: &Value) -> Result<Normalized, TranslationError> {
    if !raw.is_object() {
        return Err(TranslationError::malformed("request body must be a JSON object"));
    }
    match dialect {
        Dialect::Anthropic => anthropic::normalize_messages_request(raw),
        Dialect::OpenAI => openai::normalize_chat_request(raw),
    }
}

pub fn denormalize(dialect: Dialect, response: &CanonicalResponse) -> Value {
    match dialect {
        Dialect::Anthropic => anthropic::render_messages_response(response),
        Dialect::OpenAI => openai::render_chat_response(response),
    }
}

pub fn render_request(dialect: Dialect, request: &CanonicalRequest) -> Result<Value, TranslationError> {
    match dialect {
        Dialect::Anthropic => anthropic::render_messages_request(request),
        Dialect::OpenAI => openai::render_chat_request(request),
    }
}

pub fn count_tokens(dialect: Dialect, raw: &Value) -> Result<u32, TranslationError> {
    let normalized = normalize(dialect, raw)?;
    Ok(tokens::estimate_request_tokens(&normalized.request))
}

/// Upstream events -> canonical events, bounded by `deadline`.
///
/// Always ends with exactly one `MessageStop`: transport errors, truncation
/// and deadline expiry are turned into an `Error` event first.
pub fn canonical_events(
    mut upstream: UpstreamEventStream,
    mut builder: CanonicalStreamBuilder,
    deadline: Option<Instant>,
) -> impl Stream<Item = StreamEvent> + Send {
    async_stream::stream! {
        for event in builder.start() {
            yield event;
        }

        while !builder.is_finished() {
            let next = match deadline {
                Some(deadline) => tokio::select! {
                    item = upstream.next() => Some(item),
                    _ = tokio::time::sleep_until(deadline) => None,
                },
                None => Some(upstream.next().await),
            };

            let events = match next {
                None => {
                    tracing::warn!("Request deadline expired while relaying upstream stream");
                    builder.fail("timeout_error", "request deadline exceeded")
                },
                Some(Some(Ok(event))) => builder.push(event),
                Some(Some(Err(e))) => {
                    tracing::warn!("Upstream stream failed: {}", e);
                    builder.fail(stream_error_type(&e), &e.to_string())
                },
                Some(None) => {
                    let e = UpstreamError::Network { message: "upstream stream ended before completion".to_string() };
                    builder.fail(stream_error_type(&e), &e.to_string())
                },
            };
            for event in events {
                yield event;
            }
        }
    }
}

/// Upstream events -> dialect wire frames.
pub fn stream_translate(
    dialect: Dialect,
    upstream: UpstreamEventStream,
    builder: CanonicalStreamBuilder,
    context: EncoderContext,
    deadline: Option<Instant>,
) -> impl Stream<Item = Bytes> + Send {
    let mut encoder = encoder_for(dialect, &context);
    canonical_events(upstream, builder, deadline)
        .flat_map(move |event| futures::stream::iter(encoder.encode(&event)))
}
