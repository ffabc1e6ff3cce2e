//! Dialect framing of canonical stream events.

use bytes::Bytes;
use serde_json::Value;

use kiro_types::protocol::{Dialect, StreamEvent};

use super::anthropic::AnthropicStreamEncoder;
use super::openai::OpenAIStreamEncoder;

/// Per-response settings an encoder needs beyond the events themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderContext {
    /// Unix seconds stamped on chat chunks
    pub created: i64,
    /// Attach `usage` to the final chat chunk
    pub include_usage: bool,
}

/// Turns canonical events into wire frames, one event at a time.
pub trait StreamEncoder: Send {
    fn encode(&mut self, event: &StreamEvent) -> Vec<Bytes>;
}

pub fn encoder_for(dialect: Dialect, context: &EncoderContext) -> Box<dyn StreamEncoder> {
    match dialect {
        Dialect::Anthropic => Box::new(AnthropicStreamEncoder::new()),
        Dialect::OpenAI => Box::new(OpenAIStreamEncoder::new(context)),
    }
}

pub(crate) fn sse_event(event_type: &str, data: &Value) -> Bytes {
    Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        event_type,
        serde_json::to_string(data).unwrap_or_default()
    ))
}

pub(crate) fn sse_data(data: &Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", serde_json::to_string(data).unwrap_or_default()))
}
