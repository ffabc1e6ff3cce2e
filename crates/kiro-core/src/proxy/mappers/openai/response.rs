//! Canonical response -> OpenAI chat completion body.

use serde_json::Value;

use kiro_types::protocol::{CanonicalResponse, ContentBlock};

use super::models::{
    ChatCompletionResponse, ChatUsage, Choice, FunctionCall, ResponseMessage, ToolCall,
};

/// `chatcmpl-` id sharing the suffix of the canonical `msg_` id.
pub(crate) fn chat_completion_id(message_id: &str) -> String {
    format!("chatcmpl-{}", message_id.strip_prefix("msg_").unwrap_or(message_id))
}

pub fn render_chat_response(response: &CanonicalResponse) -> Value {
    let mut text = String::new();
    let mut has_text = false;
    let mut tool_calls = Vec::new();
    for block in &response.content {
        match block {
            ContentBlock::Text { text: part } => {
                text.push_str(part);
                has_text = true;
            },
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id: id.clone(),
                call_type: "function".to_string(),
                function: FunctionCall { name: name.clone(), arguments: input.to_string() },
            }),
            // Never produced by the upstream on the assistant side
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {},
        }
    }

    let usage = &response.usage;
    let body = ChatCompletionResponse {
        id: chat_completion_id(&response.id),
        object: "chat.completion".to_string(),
        created: response.created,
        model: response.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: has_text.then_some(text),
                tool_calls,
            },
            finish_reason: response.stop_reason.as_finish_reason().to_string(),
        }],
        usage: ChatUsage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens.saturating_add(usage.output_tokens),
        },
    };
    serde_json::to_value(&body).unwrap_or_default()
}
