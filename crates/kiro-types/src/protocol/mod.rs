//! Protocol types shared by the translators.

mod canonical;

pub use canonical::{
    BlockDelta, BlockStart, CanonicalRequest, CanonicalResponse, ContentBlock, Message, Role,
    StopReason, StreamEvent, ToolDefinition, Usage,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Public wire protocol spoken by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Anthropic Messages API (content blocks)
    Anthropic,
    /// OpenAI Chat Completions API (chat messages)
    OpenAI,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}
