//! Canonical response -> Anthropic response body.

use serde_json::Value;

use kiro_types::protocol::CanonicalResponse;

use super::models::{AnthropicUsage, MessagesResponse};
use super::request::render_block;

pub fn render_messages_response(response: &CanonicalResponse) -> Value {
    let body = MessagesResponse {
        id: response.id.clone(),
        object_type: "message".to_string(),
        role: "assistant".to_string(),
        model: response.model.clone(),
        content: response.content.iter().map(render_block).collect(),
        stop_reason: response.stop_reason.as_str().to_string(),
        stop_sequence: None,
        usage: AnthropicUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        },
    };
    serde_json::to_value(&body).unwrap_or_default()
}
