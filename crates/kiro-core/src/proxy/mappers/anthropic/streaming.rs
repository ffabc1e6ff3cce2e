//! Canonical stream events -> Anthropic SSE frames.

use bytes::Bytes;
use serde_json::{json, Value};

use kiro_types::protocol::{BlockDelta, BlockStart, StreamEvent};

use crate::proxy::mappers::streaming::{sse_event, StreamEncoder};

/// Stateless: every canonical event has a one-to-one Anthropic counterpart.
#[derive(Debug, Default)]
pub struct AnthropicStreamEncoder;

impl AnthropicStreamEncoder {
    pub fn new() -> Self {
        Self
    }
}

fn event_payload(event: &StreamEvent) -> (&'static str, Value) {
    match event {
        StreamEvent::MessageStart { id, model, usage } => (
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": id,
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": model,
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {
                        "input_tokens": usage.input_tokens,
                        "output_tokens": usage.output_tokens,
                    },
                },
            }),
        ),
        StreamEvent::ContentBlockStart { index, block } => {
            let content_block = match block {
                BlockStart::Text => json!({"type": "text", "text": ""}),
                BlockStart::ToolUse { id, name } => {
                    json!({"type": "tool_use", "id": id, "name": name, "input": {}})
                },
            };
            (
                "content_block_start",
                json!({"type": "content_block_start", "index": index, "content_block": content_block}),
            )
        },
        StreamEvent::ContentBlockDelta { index, delta } => {
            let delta = match delta {
                BlockDelta::Text { text } => json!({"type": "text_delta", "text": text}),
                BlockDelta::InputJson { partial_json } => {
                    json!({"type": "input_json_delta", "partial_json": partial_json})
                },
            };
            ("content_block_delta", json!({"type": "content_block_delta", "index": index, "delta": delta}))
        },
        StreamEvent::ContentBlockStop { index } => {
            ("content_block_stop", json!({"type": "content_block_stop", "index": index}))
        },
        StreamEvent::MessageDelta { stop_reason, usage } => (
            "message_delta",
            json!({
                "type": "message_delta",
                "delta": {"stop_reason": stop_reason.as_str(), "stop_sequence": null},
                "usage": {
                    "input_tokens": usage.input_tokens,
                    "output_tokens": usage.output_tokens,
                },
            }),
        ),
        StreamEvent::MessageStop => ("message_stop", json!({"type": "message_stop"})),
        StreamEvent::Error { error_type, message } => (
            "error",
            json!({"type": "error", "error": {"type": error_type, "message": message}}),
        ),
    }
}

impl StreamEncoder for AnthropicStreamEncoder {
    fn encode(&mut self, event: &StreamEvent) -> Vec<Bytes> {
        let (event_type, data) = event_payload(event);
        vec![sse_event(event_type, &data)]
    }
}
