//! Canonical stream events -> one complete canonical response.

use futures::StreamExt;
use serde_json::{json, Value};

use kiro_types::error::UpstreamError;
use kiro_types::protocol::{
    BlockDelta, BlockStart, CanonicalResponse, ContentBlock, StopReason, StreamEvent, Usage,
};

use super::codewhisperer::{CanonicalStreamBuilder, UpstreamEvent};
use crate::proxy::upstream::UpstreamEventStream;

enum PartialBlock {
    Text(String),
    Tool { id: String, name: String, input_json: String },
}

impl PartialBlock {
    fn into_block(self) -> ContentBlock {
        match self {
            Self::Text(text) => ContentBlock::Text { text },
            Self::Tool { id, name, input_json } => {
                let input = if input_json.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str::<Value>(&input_json).unwrap_or_else(|e| {
                        tracing::warn!(tool_use_id = %id, "Tool input is not valid JSON, using {{}}: {}", e);
                        json!({})
                    })
                };
                ContentBlock::ToolUse { id, name, input }
            },
        }
    }
}

/// Folds a canonical event sequence into a [`CanonicalResponse`].
pub struct ResponseCollector {
    id: String,
    model: String,
    created: i64,
    content: Vec<ContentBlock>,
    current: Option<PartialBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    error: Option<(String, String)>,
}

impl ResponseCollector {
    pub fn new(created: i64) -> Self {
        Self {
            id: String::new(),
            model: String::new(),
            created,
            content: Vec::new(),
            current: None,
            stop_reason: None,
            usage: Usage::default(),
            error: None,
        }
    }

    pub fn push(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::MessageStart { id, model, usage } => {
                self.id.clone_from(id);
                self.model.clone_from(model);
                self.usage = *usage;
            },
            StreamEvent::ContentBlockStart { block, .. } => {
                self.close_current();
                self.current = Some(match block {
                    BlockStart::Text => PartialBlock::Text(String::new()),
                    BlockStart::ToolUse { id, name } => {
                        PartialBlock::Tool { id: id.clone(), name: name.clone(), input_json: String::new() }
                    },
                });
            },
            StreamEvent::ContentBlockDelta { delta, .. } => match (&mut self.current, delta) {
                (Some(PartialBlock::Text(text)), BlockDelta::Text { text: more }) => text.push_str(more),
                (Some(PartialBlock::Tool { input_json, .. }), BlockDelta::InputJson { partial_json }) => {
                    input_json.push_str(partial_json);
                },
                _ => tracing::debug!("Delta does not match the open block, skipping"),
            },
            StreamEvent::ContentBlockStop { .. } => self.close_current(),
            StreamEvent::MessageDelta { stop_reason, usage } => {
                self.stop_reason = Some(*stop_reason);
                self.usage = *usage;
            },
            StreamEvent::Error { error_type, message } => {
                self.error = Some((error_type.clone(), message.clone()));
            },
            StreamEvent::MessageStop => self.close_current(),
        }
    }

    fn close_current(&mut self) {
        if let Some(block) = self.current.take() {
            self.content.push(block.into_block());
        }
    }

    /// Error reported in-band, if any, as `(error_type, message)`.
    pub fn error(&self) -> Option<&(String, String)> {
        self.error.as_ref()
    }

    /// The response, once a `MessageDelta` has been seen.
    pub fn finish(mut self) -> Option<CanonicalResponse> {
        self.close_current();
        let stop_reason = self.stop_reason?;
        Some(CanonicalResponse {
            id: self.id,
            model: self.model,
            created: self.created,
            content: self.content,
            stop_reason,
            usage: self.usage,
        })
    }
}

/// Drain an upstream reply into a complete response.
///
/// In-band exceptions and transport errors surface as [`UpstreamError`] so the
/// caller can classify them; a body that ends without a stop is a network error.
pub async fn collect_response(
    mut events: UpstreamEventStream,
    mut builder: CanonicalStreamBuilder,
    created: i64,
) -> Result<CanonicalResponse, UpstreamError> {
    let mut collector = ResponseCollector::new(created);
    for event in builder.start() {
        collector.push(&event);
    }

    while let Some(item) = events.next().await {
        let event = item?;
        if let UpstreamEvent::Exception { kind, message } = event {
            return Err(UpstreamError::Exception { kind, message });
        }
        for canonical in builder.push(event) {
            collector.push(&canonical);
        }
        if builder.is_finished() {
            break;
        }
    }

    if !builder.is_finished() {
        return Err(UpstreamError::Network { message: "upstream stream ended before completion".to_string() });
    }
    collector.finish().ok_or_else(|| UpstreamError::MalformedResponse {
        message: "upstream reply finished without a stop reason".to_string(),
    })
}
