//! Upstream events -> canonical stream events.

use std::collections::HashSet;

use kiro_types::error::UpstreamError;
use kiro_types::protocol::{BlockDelta, BlockStart, StopReason, StreamEvent, Usage};

use super::events::UpstreamEvent;
use crate::proxy::mappers::tokens::TokenTally;

#[derive(Debug)]
enum OpenBlock {
    Text { index: usize },
    Tool { index: usize, tool_use_id: String },
}

impl OpenBlock {
    fn index(&self) -> usize {
        match self {
            Self::Text { index } | Self::Tool { index, .. } => *index,
        }
    }
}

/// Builds a well-formed canonical event sequence from upstream events.
///
/// Block indices increase strictly, at most one block is open at a time and
/// exactly one `MessageStop` is produced whether the reply completes or fails.
#[derive(Debug)]
pub struct CanonicalStreamBuilder {
    message_id: String,
    model: String,
    input_tokens: u32,
    started: bool,
    finished: bool,
    next_index: usize,
    open: Option<OpenBlock>,
    /// Tool ids whose block is already closed; late fragments are dropped
    closed_tools: HashSet<String>,
    used_tool: bool,
    output: TokenTally,
}

impl CanonicalStreamBuilder {
    pub fn new(message_id: impl Into<String>, model: impl Into<String>, input_tokens: u32) -> Self {
        Self {
            message_id: message_id.into(),
            model: model.into(),
            input_tokens,
            started: false,
            finished: false,
            next_index: 0,
            open: None,
            closed_tools: HashSet::new(),
            used_tool: false,
            output: TokenTally::default(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The opening `MessageStart`. Empty when already emitted.
    pub fn start(&mut self) -> Vec<StreamEvent> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        vec![StreamEvent::MessageStart {
            id: self.message_id.clone(),
            model: self.model.clone(),
            usage: Usage { input_tokens: self.input_tokens, output_tokens: 0 },
        }]
    }

    pub fn push(&mut self, event: UpstreamEvent) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut out = self.start();
        match event {
            UpstreamEvent::AssistantText(text) => self.push_text(text, &mut out),
            UpstreamEvent::ToolUse { tool_use_id, name, input, stop } => {
                self.push_tool(tool_use_id, name, input, stop, &mut out);
            },
            UpstreamEvent::MessageStop | UpstreamEvent::Completed => out.extend(self.finish()),
            UpstreamEvent::Exception { kind, message } => {
                let error = UpstreamError::Exception { kind, message };
                out.extend(self.fail(stream_error_type(&error), &error.to_string()));
            },
            UpstreamEvent::Ignored(_) => {},
        }
        out
    }

    fn push_text(&mut self, text: String, out: &mut Vec<StreamEvent>) {
        if text.is_empty() {
            return;
        }
        let index = match self.open {
            Some(OpenBlock::Text { index }) => index,
            _ => {
                self.close_open(out);
                let index = self.allocate_index();
                out.push(StreamEvent::ContentBlockStart { index, block: BlockStart::Text });
                self.open = Some(OpenBlock::Text { index });
                index
            },
        };
        self.output.add(&text);
        out.push(StreamEvent::ContentBlockDelta { index, delta: BlockDelta::Text { text } });
    }

    fn push_tool(
        &mut self,
        tool_use_id: String,
        name: String,
        input: Option<String>,
        stop: bool,
        out: &mut Vec<StreamEvent>,
    ) {
        if self.closed_tools.contains(&tool_use_id) {
            tracing::debug!(tool_use_id = %tool_use_id, "Dropping fragment for a closed tool call");
            return;
        }
        let index = match &self.open {
            Some(OpenBlock::Tool { index, tool_use_id: open_id }) if *open_id == tool_use_id => *index,
            _ => {
                self.close_open(out);
                let index = self.allocate_index();
                self.output.add(&name);
                self.used_tool = true;
                out.push(StreamEvent::ContentBlockStart {
                    index,
                    block: BlockStart::ToolUse { id: tool_use_id.clone(), name },
                });
                self.open = Some(OpenBlock::Tool { index, tool_use_id: tool_use_id.clone() });
                index
            },
        };
        if let Some(partial_json) = input.filter(|s| !s.is_empty()) {
            self.output.add(&partial_json);
            out.push(StreamEvent::ContentBlockDelta { index, delta: BlockDelta::InputJson { partial_json } });
        }
        if stop {
            self.close_open(out);
        }
    }

    fn allocate_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn close_open(&mut self, out: &mut Vec<StreamEvent>) {
        if let Some(block) = self.open.take() {
            out.push(StreamEvent::ContentBlockStop { index: block.index() });
            if let OpenBlock::Tool { tool_use_id, .. } = block {
                self.closed_tools.insert(tool_use_id);
            }
        }
    }

    /// Close the reply normally. Idempotent.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut out = self.start();
        self.close_open(&mut out);
        let stop_reason = if self.used_tool { StopReason::ToolUse } else { StopReason::EndTurn };
        out.push(StreamEvent::MessageDelta {
            stop_reason,
            usage: Usage { input_tokens: self.input_tokens, output_tokens: self.output.tokens() },
        });
        out.push(StreamEvent::MessageStop);
        self.finished = true;
        out
    }

    /// Close the reply with an error event. Idempotent, and a no-op after [`finish`](Self::finish).
    pub fn fail(&mut self, error_type: &str, message: &str) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut out = self.start();
        self.close_open(&mut out);
        out.push(StreamEvent::Error { error_type: error_type.to_string(), message: message.to_string() });
        out.push(StreamEvent::MessageStop);
        self.finished = true;
        out
    }
}

/// Blocks-dialect error type for a failure that ends a stream.
pub fn stream_error_type(error: &UpstreamError) -> &'static str {
    match error.http_status_code() {
        429 => "rate_limit_error",
        504 => "timeout_error",
        400..=499 => "invalid_request_error",
        _ => "api_error",
    }
}
