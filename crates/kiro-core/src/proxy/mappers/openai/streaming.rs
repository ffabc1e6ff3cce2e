//! Canonical stream events -> `chat.completion.chunk` frames.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::{json, Value};

use kiro_types::error::openai_error_type_for;
use kiro_types::protocol::{BlockDelta, BlockStart, StreamEvent};

use super::response::chat_completion_id;
use crate::proxy::mappers::streaming::{sse_data, EncoderContext, StreamEncoder};

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

pub struct OpenAIStreamEncoder {
    id: String,
    model: String,
    created: i64,
    include_usage: bool,
    role_sent: bool,
    /// Canonical block index -> position in `tool_calls`
    tool_indices: HashMap<usize, usize>,
    /// Finish or error chunk already written
    finished: bool,
}

impl OpenAIStreamEncoder {
    pub fn new(context: &EncoderContext) -> Self {
        Self {
            id: String::new(),
            model: String::new(),
            created: context.created,
            include_usage: context.include_usage,
            role_sent: false,
            tool_indices: HashMap::new(),
            finished: false,
        }
    }

    fn chunk(&self, delta: Value, finish_reason: Option<&str>) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        })
    }
}

impl StreamEncoder for OpenAIStreamEncoder {
    fn encode(&mut self, event: &StreamEvent) -> Vec<Bytes> {
        match event {
            StreamEvent::MessageStart { id, model, .. } => {
                self.id = chat_completion_id(id);
                self.model.clone_from(model);
                if self.role_sent {
                    return Vec::new();
                }
                self.role_sent = true;
                vec![sse_data(&self.chunk(json!({"role": "assistant", "content": ""}), None))]
            },
            StreamEvent::ContentBlockStart { index, block: BlockStart::ToolUse { id, name } } => {
                let position = self.tool_indices.len();
                self.tool_indices.insert(*index, position);
                let delta = json!({
                    "tool_calls": [{
                        "index": position,
                        "id": id,
                        "type": "function",
                        "function": {"name": name, "arguments": ""},
                    }],
                });
                vec![sse_data(&self.chunk(delta, None))]
            },
            StreamEvent::ContentBlockDelta { delta: BlockDelta::Text { text }, .. } => {
                if text.is_empty() {
                    return Vec::new();
                }
                vec![sse_data(&self.chunk(json!({"content": text}), None))]
            },
            StreamEvent::ContentBlockDelta { index, delta: BlockDelta::InputJson { partial_json } } => {
                let Some(position) = self.tool_indices.get(index).copied() else {
                    return Vec::new();
                };
                let delta = json!({
                    "tool_calls": [{"index": position, "function": {"arguments": partial_json}}],
                });
                vec![sse_data(&self.chunk(delta, None))]
            },
            StreamEvent::ContentBlockStart { block: BlockStart::Text, .. }
            | StreamEvent::ContentBlockStop { .. } => Vec::new(),
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if self.finished {
                    return Vec::new();
                }
                self.finished = true;
                let mut chunk = self.chunk(json!({}), Some(stop_reason.as_finish_reason()));
                if self.include_usage {
                    chunk["usage"] = json!({
                        "prompt_tokens": usage.input_tokens,
                        "completion_tokens": usage.output_tokens,
                        "total_tokens": usage.input_tokens.saturating_add(usage.output_tokens),
                    });
                }
                vec![sse_data(&chunk)]
            },
            StreamEvent::Error { error_type, message } => {
                if self.finished {
                    return Vec::new();
                }
                self.finished = true;
                let error = json!({
                    "error": {
                        "message": message,
                        "type": openai_error_type_for(error_type),
                        "code": null,
                    },
                });
                vec![sse_data(&error)]
            },
            StreamEvent::MessageStop => vec![Bytes::from_static(DONE_FRAME)],
        }
    }
}
