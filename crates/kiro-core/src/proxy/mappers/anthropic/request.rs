//! Anthropic request <-> canonical request.

use serde::Deserialize;
use serde_json::{Map, Value};

use kiro_types::error::TranslationError;
use kiro_types::protocol::{CanonicalRequest, ContentBlock, Message, Role, ToolDefinition};

use super::models::{
    AnthropicBlock, AnthropicMessage, AnthropicTool, ImageSource, MessageContent, MessagesRequest,
    SystemPrompt, ToolResultContent, ToolResultPart,
};
use crate::proxy::mappers::{decode_base64_image, record_warning, Normalized};

/// Prompt-caching hints; no effect upstream, dropped without a warning.
const SILENT_FIELDS: &[&str] = &["cache_control"];

pub fn normalize_messages_request(raw: &Value) -> Result<Normalized, TranslationError> {
    let request = MessagesRequest::deserialize(raw)?;
    let mut warnings = Vec::new();

    for key in request.extra.keys() {
        record_warning(&mut warnings, format!("dropped unsupported field '{}'", key));
    }
    if request.model.trim().is_empty() {
        return Err(TranslationError::malformed("model must not be empty"));
    }
    if request.messages.is_empty() {
        return Err(TranslationError::malformed("messages must not be empty"));
    }

    let system = match request.system {
        None => None,
        Some(SystemPrompt::String(text)) => Some(text),
        Some(SystemPrompt::Blocks(blocks)) => {
            let mut parts = Vec::with_capacity(blocks.len());
            for (i, block) in blocks.into_iter().enumerate() {
                if block.block_type == "text" {
                    parts.push(block.text);
                } else {
                    record_warning(
                        &mut warnings,
                        format!("dropped system[{}] of type '{}'", i, block.block_type),
                    );
                }
            }
            Some(parts.join("\n"))
        },
    }
    .filter(|s| !s.is_empty());

    let mut messages = Vec::with_capacity(request.messages.len());
    for (i, message) in request.messages.into_iter().enumerate() {
        let role = match message.role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => {
                return Err(TranslationError::malformed(format!(
                    "messages[{}].role '{}' is not one of user, assistant",
                    i, other
                )))
            },
        };
        let content = convert_content(message.content, i, &mut warnings)?;
        messages.push(Message { role, content });
    }

    let mut tools = Vec::with_capacity(request.tools.len());
    for (i, tool) in request.tools.into_iter().enumerate() {
        tools.push(convert_tool(tool, i, &mut warnings)?);
    }

    Ok(Normalized {
        request: CanonicalRequest {
            model: request.model,
            system,
            messages,
            tools,
            max_tokens: request.max_tokens,
            stream: request.stream,
            stop_sequences: request.stop_sequences,
            temperature: request.temperature,
            top_p: request.top_p,
            stream_usage: false,
        },
        warnings,
    })
}

fn convert_content(
    content: MessageContent,
    message_index: usize,
    warnings: &mut Vec<String>,
) -> Result<Vec<ContentBlock>, TranslationError> {
    let blocks = match content {
        MessageContent::String(text) => return Ok(vec![ContentBlock::Text { text }]),
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut converted = Vec::with_capacity(blocks.len());
    for (j, block) in blocks.into_iter().enumerate() {
        let path = format!("messages[{}].content[{}]", message_index, j);
        match block {
            AnthropicBlock::Text { text } => converted.push(ContentBlock::Text { text }),
            AnthropicBlock::Image { source } => {
                if let Some(image) = convert_image(source, &path, warnings)? {
                    converted.push(image);
                }
            },
            AnthropicBlock::ToolUse { id, name, input } => {
                if name.is_empty() {
                    return Err(TranslationError::malformed(format!("{}: tool_use without a name", path)));
                }
                converted.push(ContentBlock::ToolUse { id, name, input });
            },
            AnthropicBlock::ToolResult { tool_use_id, content, is_error } => {
                converted.push(ContentBlock::ToolResult {
                    tool_use_id,
                    content: tool_result_text(content, &path, warnings),
                    is_error: is_error.unwrap_or(false),
                });
            },
            AnthropicBlock::Thinking { .. } | AnthropicBlock::RedactedThinking { .. } => {
                record_warning(warnings, format!("dropped thinking block at {}", path));
            },
        }
    }
    Ok(converted)
}

fn convert_image(
    source: ImageSource,
    path: &str,
    warnings: &mut Vec<String>,
) -> Result<Option<ContentBlock>, TranslationError> {
    match source {
        ImageSource::Base64 { media_type, data } => {
            decode_base64_image(&data, path)?;
            Ok(Some(ContentBlock::Image { media_type, data }))
        },
        ImageSource::Url { .. } => {
            record_warning(warnings, format!("dropped remote image at {}", path));
            Ok(None)
        },
    }
}

fn tool_result_text(content: ToolResultContent, path: &str, warnings: &mut Vec<String>) -> String {
    match content {
        ToolResultContent::String(text) => text,
        ToolResultContent::Blocks(parts) => {
            let mut texts = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    ToolResultPart::Text { text } => texts.push(text),
                    ToolResultPart::Image { .. } => {
                        record_warning(warnings, format!("dropped image inside tool_result at {}", path));
                    },
                }
            }
            texts.join("\n")
        },
    }
}

fn convert_tool(
    tool: AnthropicTool,
    index: usize,
    warnings: &mut Vec<String>,
) -> Result<ToolDefinition, TranslationError> {
    if let Some(tool_type) = tool.tool_type.as_deref().filter(|t| *t != "custom") {
        return Err(TranslationError::unsupported(
            format!("tools[{}].type", index),
            format!("server tool type '{}' has no upstream equivalent", tool_type),
        ));
    }
    if tool.name.trim().is_empty() {
        return Err(TranslationError::malformed(format!("tools[{}] has no name", index)));
    }
    let Some(input_schema) = tool.input_schema else {
        return Err(TranslationError::unsupported(
            format!("tools[{}].input_schema", index),
            format!("tool '{}' has no input schema", tool.name),
        ));
    };
    for key in tool.extra.keys().filter(|k| !SILENT_FIELDS.contains(&k.as_str())) {
        record_warning(warnings, format!("dropped tools[{}].{}", index, key));
    }
    Ok(ToolDefinition { name: tool.name, description: tool.description.unwrap_or_default(), input_schema })
}

/// Inverse of [`normalize_messages_request`].
pub fn render_messages_request(request: &CanonicalRequest) -> Result<Value, TranslationError> {
    let body = MessagesRequest {
        model: request.model.clone(),
        messages: request
            .messages
            .iter()
            .map(|message| AnthropicMessage {
                role: match message.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: MessageContent::Blocks(message.content.iter().map(render_block).collect()),
            })
            .collect(),
        system: request.system.clone().map(SystemPrompt::String),
        tools: request
            .tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: Some(tool.description.clone()).filter(|d| !d.is_empty()),
                input_schema: Some(tool.input_schema.clone()),
                tool_type: None,
                extra: Map::new(),
            })
            .collect(),
        max_tokens: request.max_tokens,
        stream: request.stream,
        stop_sequences: request.stop_sequences.clone(),
        temperature: request.temperature,
        top_p: request.top_p,
        extra: Map::new(),
    };
    Ok(serde_json::to_value(&body)?)
}

pub(super) fn render_block(block: &ContentBlock) -> AnthropicBlock {
    match block {
        ContentBlock::Text { text } => AnthropicBlock::Text { text: text.clone() },
        ContentBlock::Image { media_type, data } => AnthropicBlock::Image {
            source: ImageSource::Base64 { media_type: media_type.clone(), data: data.clone() },
        },
        ContentBlock::ToolUse { id, name, input } => {
            AnthropicBlock::ToolUse { id: id.clone(), name: name.clone(), input: input.clone() }
        },
        ContentBlock::ToolResult { tool_use_id, content, is_error } => AnthropicBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: ToolResultContent::String(content.clone()),
            is_error: is_error.then_some(true),
        },
    }
}
