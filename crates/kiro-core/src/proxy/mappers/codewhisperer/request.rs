//! Canonical request -> `generateAssistantResponse` body.

use kiro_types::error::TranslationError;
use kiro_types::protocol::{CanonicalRequest, ContentBlock, Message, Role, ToolDefinition};

use super::models::{
    AssistantResponseMessage, ConversationState, CurrentMessage, GenerateAssistantRequest,
    HistoryItem, ImageBytes, InputSchema, TextContent, ToolSpecification, UpstreamImage,
    UpstreamTool, UpstreamToolResult, UpstreamToolUse, UserInputMessage, UserInputMessageContext,
};
use crate::proxy::mappers::model_mapping::resolve_upstream_model;

const CHAT_TRIGGER_TYPE: &str = "MANUAL";
const ORIGIN: &str = "AI_EDITOR";

/// Per-call inputs that do not come from the client request.
#[derive(Debug, Clone)]
pub struct UpstreamOptions<'a> {
    pub conversation_id: String,
    pub profile_arn: Option<&'a str>,
    pub max_tool_description_length: usize,
}

pub fn build_upstream_request(
    request: &CanonicalRequest,
    options: &UpstreamOptions<'_>,
) -> Result<GenerateAssistantRequest, TranslationError> {
    let model_id = resolve_upstream_model(&request.model)?;
    let unsent = unsent_sampling_fields(request);
    if !unsent.is_empty() {
        tracing::debug!("Upstream has no field for {}; not forwarded", unsent.join(", "));
    }
    let mut turns = merge_consecutive_roles(&request.messages);

    let Some(last) = turns.pop() else {
        return Err(TranslationError::malformed("messages must not be empty"));
    };
    if last.role != Role::User {
        return Err(TranslationError::unsupported(
            format!("messages[{}].role", request.messages.len().saturating_sub(1)),
            "the conversation must end with a user message",
        ));
    }

    // The system prompt rides on the first user turn
    let mut system = request.system.as_deref().filter(|s| !s.is_empty());

    let mut history = Vec::with_capacity(turns.len());
    for turn in &turns {
        match turn.role {
            Role::User => {
                let message = user_input(&turn.content, model_id, system.take(), Vec::new())?;
                history.push(HistoryItem::UserInputMessage(message));
            },
            Role::Assistant => {
                history.push(HistoryItem::AssistantResponseMessage(assistant_response(&turn.content)));
            },
        }
    }

    let tools = request
        .tools
        .iter()
        .map(|tool| upstream_tool(tool, options.max_tool_description_length))
        .collect();
    let current = user_input(&last.content, model_id, system.take(), tools)?;

    Ok(GenerateAssistantRequest {
        conversation_state: ConversationState {
            chat_trigger_type: CHAT_TRIGGER_TYPE.to_string(),
            conversation_id: options.conversation_id.clone(),
            current_message: CurrentMessage { user_input_message: current },
            history,
        },
        profile_arn: options.profile_arn.map(str::to_string),
    })
}

/// Sampling controls the client set that `generateAssistantResponse` cannot carry.
pub(crate) fn unsent_sampling_fields(request: &CanonicalRequest) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if request.max_tokens.is_some() {
        fields.push("max_tokens");
    }
    if !request.stop_sequences.is_empty() {
        fields.push("stop_sequences");
    }
    if request.temperature.is_some() {
        fields.push("temperature");
    }
    if request.top_p.is_some() {
        fields.push("top_p");
    }
    fields
}

/// The upstream expects strictly alternating turns.
fn merge_consecutive_roles(messages: &[Message]) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        match merged.last_mut() {
            Some(previous) if previous.role == message.role => {
                previous.content.extend(message.content.iter().cloned());
            },
            _ => merged.push(message.clone()),
        }
    }
    merged
}

fn user_input(
    blocks: &[ContentBlock],
    model_id: &str,
    system: Option<&str>,
    tools: Vec<UpstreamTool>,
) -> Result<UserInputMessage, TranslationError> {
    let mut texts: Vec<&str> = Vec::new();
    let mut images = Vec::new();
    let mut tool_results = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::Image { media_type, data } => images.push(UpstreamImage {
                format: image_format(media_type)?.to_string(),
                source: ImageBytes { bytes: data.clone() },
            }),
            ContentBlock::ToolResult { tool_use_id, content, is_error } => {
                tool_results.push(UpstreamToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: vec![TextContent { text: content.clone() }],
                    status: if *is_error { "error" } else { "success" }.to_string(),
                });
            },
            // A tool call inside a user turn has no upstream representation
            ContentBlock::ToolUse { name, .. } => {
                return Err(TranslationError::unsupported(
                    "messages.content",
                    format!("tool_use '{}' inside a user message", name),
                ))
            },
        }
    }

    let mut content = texts.join("\n");
    if let Some(system) = system {
        content = if content.is_empty() { system.to_string() } else { format!("{}\n\n{}", system, content) };
    }

    Ok(UserInputMessage {
        content,
        model_id: model_id.to_string(),
        origin: ORIGIN.to_string(),
        images,
        user_input_message_context: UserInputMessageContext { tool_results, tools },
    })
}

fn assistant_response(blocks: &[ContentBlock]) -> AssistantResponseMessage {
    let mut texts: Vec<&str> = Vec::new();
    let mut tool_uses = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::ToolUse { id, name, input } => tool_uses.push(UpstreamToolUse {
                tool_use_id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {
                tracing::debug!("Skipping non-text block in assistant history");
            },
        }
    }
    AssistantResponseMessage { content: texts.join("\n"), tool_uses }
}

fn upstream_tool(tool: &ToolDefinition, max_description_length: usize) -> UpstreamTool {
    UpstreamTool {
        tool_specification: ToolSpecification {
            name: tool.name.clone(),
            description: truncate_chars(&tool.description, max_description_length),
            input_schema: InputSchema { json: tool.input_schema.clone() },
        },
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => s[..cut].to_string(),
        None => s.to_string(),
    }
}

fn image_format(media_type: &str) -> Result<&'static str, TranslationError> {
    match media_type {
        "image/png" => Ok("png"),
        "image/jpeg" | "image/jpg" => Ok("jpeg"),
        "image/gif" => Ok("gif"),
        "image/webp" => Ok("webp"),
        other => Err(TranslationError::unsupported(
            "image.media_type",
            format!("image type '{}' is not accepted upstream", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> UpstreamOptions<'static> {
        UpstreamOptions {
            conversation_id: "conv-1".to_string(),
            profile_arn: Some("arn:aws:codewhisperer:us-east-1:1:profile/X"),
            max_tool_description_length: 10,
        }
    }

    fn request(messages: Vec<Message>) -> CanonicalRequest {
        CanonicalRequest::new("claude-sonnet-4-20250514", messages)
    }

    #[test]
    fn test_single_turn_with_system_and_tools() {
        let mut req = request(vec![Message::user(vec![ContentBlock::text("Hi")])]);
        req.system = Some("Be terse".to_string());
        req.tools.push(ToolDefinition {
            name: "lookup".to_string(),
            description: "A very long description".to_string(),
            input_schema: json!({"type": "object"}),
        });

        let body = build_upstream_request(&req, &options()).unwrap();
        let json = serde_json::to_value(&body).unwrap();
        let current = &json["conversationState"]["currentMessage"]["userInputMessage"];

        assert_eq!(json["conversationState"]["chatTriggerType"], "MANUAL");
        assert_eq!(json["profileArn"], "arn:aws:codewhisperer:us-east-1:1:profile/X");
        assert_eq!(current["content"], "Be terse\n\nHi");
        assert_eq!(current["modelId"], "CLAUDE_SONNET_4_20250514_V1_0");
        assert_eq!(current["origin"], "AI_EDITOR");
        let spec = &current["userInputMessageContext"]["tools"][0]["toolSpecification"];
        assert_eq!(spec["description"], "A very lon");
        assert_eq!(spec["inputSchema"]["json"]["type"], "object");
        assert!(json["conversationState"]["history"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_sampling_controls_are_reported_not_sent() {
        let mut req = request(vec![Message::user(vec![ContentBlock::text("Hi")])]);
        assert!(unsent_sampling_fields(&req).is_empty());

        req.max_tokens = Some(256);
        req.temperature = Some(0.2);
        req.stop_sequences = vec!["END".to_string()];
        assert_eq!(unsent_sampling_fields(&req), vec!["max_tokens", "stop_sequences", "temperature"]);

        let json = serde_json::to_value(build_upstream_request(&req, &options()).unwrap()).unwrap();
        let text = json.to_string();
        assert!(!text.contains("temperature"));
        assert!(!text.contains("END"));
    }

    #[test]
    fn test_history_alternates_and_carries_tool_traffic() {
        let req = request(vec![
            Message::user(vec![ContentBlock::text("What's the weather?")]),
            Message::user(vec![ContentBlock::text("In Paris.")]),
            Message::assistant(vec![
                ContentBlock::text("Checking."),
                ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "weather".to_string(),
                    input: json!({"city": "Paris"}),
                },
            ]),
            Message::user(vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_1".to_string(),
                content: "18C".to_string(),
                is_error: false,
            }]),
        ]);

        let body = build_upstream_request(&req, &options()).unwrap();
        let history = &body.conversation_state.history;
        assert_eq!(history.len(), 2);
        let HistoryItem::UserInputMessage(first) = &history[0] else { panic!("expected user turn") };
        assert_eq!(first.content, "What's the weather?\nIn Paris.");
        let HistoryItem::AssistantResponseMessage(second) = &history[1] else {
            panic!("expected assistant turn")
        };
        assert_eq!(second.tool_uses[0].tool_use_id, "toolu_1");

        let current = &body.conversation_state.current_message.user_input_message;
        assert_eq!(current.user_input_message_context.tool_results[0].status, "success");
        assert_eq!(current.user_input_message_context.tool_results[0].content[0].text, "18C");
    }

    #[test]
    fn test_conversation_ending_with_assistant_is_rejected() {
        let req = request(vec![
            Message::user(vec![ContentBlock::text("Hi")]),
            Message::assistant(vec![ContentBlock::text("Hello")]),
        ]);
        assert!(matches!(
            build_upstream_request(&req, &options()),
            Err(TranslationError::UnsupportedField { .. })
        ));
    }

    #[test]
    fn test_image_formats() {
        let req = request(vec![Message::user(vec![ContentBlock::Image {
            media_type: "image/jpeg".to_string(),
            data: "AAAA".to_string(),
        }])]);
        let body = build_upstream_request(&req, &options()).unwrap();
        assert_eq!(body.conversation_state.current_message.user_input_message.images[0].format, "jpeg");

        let bmp = request(vec![Message::user(vec![ContentBlock::Image {
            media_type: "image/bmp".to_string(),
            data: "AAAA".to_string(),
        }])]);
        assert!(build_upstream_request(&bmp, &options()).is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
