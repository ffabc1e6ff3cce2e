//! OpenAI chat request <-> canonical request.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use kiro_types::error::TranslationError;
use kiro_types::protocol::{CanonicalRequest, ContentBlock, Message, Role, ToolDefinition};

use super::models::{
    ChatCompletionRequest, ChatContent, ChatMessage, ChatTool, ContentPart, FunctionCall,
    FunctionDefinition, ImageUrl, StopSequences, StreamOptions, ToolCall,
};
use crate::proxy::mappers::{decode_base64_image, record_warning, Normalized};

pub fn normalize_chat_request(raw: &Value) -> Result<Normalized, TranslationError> {
    let request = ChatCompletionRequest::deserialize(raw)?;
    let mut warnings = Vec::new();

    for key in request.extra.keys() {
        record_warning(&mut warnings, format!("dropped unsupported field '{}'", key));
    }
    if request.model.trim().is_empty() {
        return Err(TranslationError::malformed("model must not be empty"));
    }
    if request.n.is_some_and(|n| n > 1) {
        return Err(TranslationError::unsupported("n", "only a single choice per request is supported"));
    }
    if request.messages.is_empty() {
        return Err(TranslationError::malformed("messages must not be empty"));
    }

    let mut system_parts = Vec::new();
    let mut messages: Vec<Message> = Vec::with_capacity(request.messages.len());
    // Consecutive tool messages collapse into a single user turn
    let mut in_tool_run = false;

    for (i, message) in request.messages.into_iter().enumerate() {
        let is_tool = message.role == "tool";
        match message.role.as_str() {
            "system" | "developer" => {
                let text = content_text(message.content, i, &mut warnings);
                if !text.is_empty() {
                    system_parts.push(text);
                }
            },
            "user" => {
                let blocks = convert_content(message.content, i, &mut warnings)?;
                messages.push(Message::user(blocks));
            },
            "assistant" => {
                let mut blocks = convert_content(message.content, i, &mut warnings)?;
                for (j, call) in message.tool_calls.into_iter().enumerate() {
                    blocks.push(convert_tool_call(call, i, j)?);
                }
                messages.push(Message::assistant(blocks));
            },
            "tool" => {
                let tool_use_id = message.tool_call_id.ok_or_else(|| {
                    TranslationError::malformed(format!("messages[{}]: tool message without tool_call_id", i))
                })?;
                let block = ContentBlock::ToolResult {
                    tool_use_id,
                    content: content_text(message.content, i, &mut warnings),
                    is_error: false,
                };
                let continues_run = in_tool_run && !messages.is_empty();
                if let Some(last) = messages.last_mut().filter(|_| continues_run) {
                    last.content.push(block);
                } else {
                    messages.push(Message::user(vec![block]));
                }
            },
            "function" => {
                return Err(TranslationError::unsupported(
                    format!("messages[{}].role", i),
                    "legacy function messages are not supported, use tool messages",
                ))
            },
            other => {
                return Err(TranslationError::malformed(format!(
                    "messages[{}].role '{}' is not recognized",
                    i, other
                )))
            },
        }
        in_tool_run = is_tool;
    }

    let mut tools = Vec::with_capacity(request.tools.len());
    for (i, tool) in request.tools.into_iter().enumerate() {
        tools.push(convert_tool(tool, i)?);
    }

    Ok(Normalized {
        request: CanonicalRequest {
            model: request.model,
            system: Some(system_parts.join("\n\n")).filter(|s| !s.is_empty()),
            messages,
            tools,
            max_tokens: request.max_completion_tokens.or(request.max_tokens),
            stream: request.stream,
            stop_sequences: request.stop.map(StopSequences::into_vec).unwrap_or_default(),
            temperature: request.temperature,
            top_p: request.top_p,
            stream_usage: request.stream_options.is_some_and(|o| o.include_usage),
        },
        warnings,
    })
}

/// Text-only view of a message, for roles that cannot carry images.
fn content_text(content: Option<ChatContent>, index: usize, warnings: &mut Vec<String>) -> String {
    match content {
        None => String::new(),
        Some(ChatContent::Text(text)) => text,
        Some(ChatContent::Parts(parts)) => {
            let mut texts = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    ContentPart::Text { text } => texts.push(text),
                    ContentPart::ImageUrl { .. } => {
                        record_warning(warnings, format!("dropped image in messages[{}]", index));
                    },
                }
            }
            texts.join("\n")
        },
    }
}

fn convert_content(
    content: Option<ChatContent>,
    index: usize,
    warnings: &mut Vec<String>,
) -> Result<Vec<ContentBlock>, TranslationError> {
    let parts = match content {
        None => return Ok(Vec::new()),
        Some(ChatContent::Text(text)) => return Ok(vec![ContentBlock::Text { text }]),
        Some(ChatContent::Parts(parts)) => parts,
    };

    let mut blocks = Vec::with_capacity(parts.len());
    for (j, part) in parts.into_iter().enumerate() {
        match part {
            ContentPart::Text { text } => blocks.push(ContentBlock::Text { text }),
            ContentPart::ImageUrl { image_url } => {
                let path = format!("messages[{}].content[{}]", index, j);
                if image_url.url.starts_with("data:") {
                    blocks.push(parse_data_url(&image_url.url, &path)?);
                } else {
                    record_warning(warnings, format!("dropped remote image at {}", path));
                }
            },
        }
    }
    Ok(blocks)
}

fn parse_data_url(url: &str, path: &str) -> Result<ContentBlock, TranslationError> {
    let rest = url.strip_prefix("data:").unwrap_or(url);
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| TranslationError::malformed(format!("{}: data URL has no payload", path)))?;
    let media_type = header.strip_suffix(";base64").ok_or_else(|| {
        TranslationError::malformed(format!("{}: only base64 data URLs are supported", path))
    })?;
    decode_base64_image(data, path)?;
    Ok(ContentBlock::Image { media_type: media_type.to_string(), data: data.to_string() })
}

fn convert_tool_call(call: ToolCall, index: usize, call_index: usize) -> Result<ContentBlock, TranslationError> {
    let path = format!("messages[{}].tool_calls[{}]", index, call_index);
    if call.call_type != "function" {
        return Err(TranslationError::unsupported(
            format!("{}.type", path),
            format!("tool call type '{}' is not supported", call.call_type),
        ));
    }
    if call.function.name.is_empty() {
        return Err(TranslationError::malformed(format!("{}: function name is empty", path)));
    }
    let arguments = call.function.arguments.trim();
    let input = if arguments.is_empty() {
        json!({})
    } else {
        serde_json::from_str(arguments).map_err(|e| {
            TranslationError::malformed(format!("{}.function.arguments is not valid JSON: {}", path, e))
        })?
    };
    Ok(ContentBlock::ToolUse { id: call.id, name: call.function.name, input })
}

fn convert_tool(tool: ChatTool, index: usize) -> Result<ToolDefinition, TranslationError> {
    if tool.tool_type != "function" {
        return Err(TranslationError::unsupported(
            format!("tools[{}].type", index),
            format!("tool type '{}' is not supported", tool.tool_type),
        ));
    }
    let function = tool
        .function
        .ok_or_else(|| TranslationError::malformed(format!("tools[{}] has no function object", index)))?;
    if function.name.trim().is_empty() {
        return Err(TranslationError::malformed(format!("tools[{}] has no name", index)));
    }
    Ok(ToolDefinition {
        name: function.name,
        description: function.description.unwrap_or_default(),
        // A function without parameters takes none
        input_schema: function.parameters.unwrap_or_else(|| json!({"type": "object", "properties": {}})),
    })
}

/// Inverse of [`normalize_chat_request`].
pub fn render_chat_request(request: &CanonicalRequest) -> Result<Value, TranslationError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(ChatMessage::new("system", Some(ChatContent::Text(system.clone()))));
    }
    for message in &request.messages {
        match message.role {
            Role::User => render_user_message(&message.content, &mut messages),
            Role::Assistant => messages.push(render_assistant_message(&message.content)),
        }
    }

    let body = ChatCompletionRequest {
        model: request.model.clone(),
        messages,
        tools: request
            .tools
            .iter()
            .map(|tool| ChatTool {
                tool_type: "function".to_string(),
                function: Some(FunctionDefinition {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()).filter(|d| !d.is_empty()),
                    parameters: Some(tool.input_schema.clone()),
                }),
            })
            .collect(),
        max_tokens: request.max_tokens,
        max_completion_tokens: None,
        stream: request.stream,
        stream_options: request.stream_usage.then_some(StreamOptions { include_usage: true }),
        stop: Some(StopSequences::Many(request.stop_sequences.clone()))
            .filter(|_| !request.stop_sequences.is_empty()),
        temperature: request.temperature,
        top_p: request.top_p,
        n: None,
        extra: Map::new(),
    };
    Ok(serde_json::to_value(&body)?)
}

/// Tool results become `tool` messages; the remaining blocks keep their
/// relative order in `user` messages around them.
fn render_user_message(blocks: &[ContentBlock], out: &mut Vec<ChatMessage>) {
    if blocks.is_empty() {
        out.push(ChatMessage::new("user", None));
        return;
    }
    let mut pending: Vec<&ContentBlock> = Vec::new();
    for block in blocks {
        if let ContentBlock::ToolResult { tool_use_id, content, .. } = block {
            flush_user_blocks(&mut pending, out);
            let mut tool_message = ChatMessage::new("tool", Some(ChatContent::Text(content.clone())));
            tool_message.tool_call_id = Some(tool_use_id.clone());
            out.push(tool_message);
        } else {
            pending.push(block);
        }
    }
    flush_user_blocks(&mut pending, out);
}

fn flush_user_blocks(pending: &mut Vec<&ContentBlock>, out: &mut Vec<ChatMessage>) {
    if pending.is_empty() {
        return;
    }
    out.push(ChatMessage::new("user", render_content(pending.as_slice())));
    pending.clear();
}

fn render_assistant_message(blocks: &[ContentBlock]) -> ChatMessage {
    let content_blocks: Vec<&ContentBlock> =
        blocks.iter().filter(|b| !matches!(b, ContentBlock::ToolUse { .. })).collect();
    let mut message = ChatMessage::new("assistant", render_content(&content_blocks));
    message.tool_calls = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                id: id.clone(),
                call_type: "function".to_string(),
                function: FunctionCall { name: name.clone(), arguments: input.to_string() },
            }),
            _ => None,
        })
        .collect();
    message
}

fn render_content(blocks: &[&ContentBlock]) -> Option<ChatContent> {
    match blocks {
        [] => None,
        [ContentBlock::Text { text }] => Some(ChatContent::Text(text.clone())),
        _ => Some(ChatContent::Parts(
            blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(ContentPart::Text { text: text.clone() }),
                    ContentBlock::Image { media_type, data } => Some(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{};base64,{}", media_type, data),
                            detail: None,
                        },
                    }),
                    ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
                })
                .collect(),
        )),
    }
}
