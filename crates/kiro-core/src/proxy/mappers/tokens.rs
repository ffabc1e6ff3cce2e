//! Approximate token accounting.
//!
//! The upstream does not report usage, so both prompt and completion tokens
//! are estimated locally:
//! - ASCII: ~4 characters per token
//! - Other scripts: ~1.5 characters per token
//! - 15% safety margin on the sum
//!
//! Everything is integer arithmetic so identical input always yields the
//! same count, and adding characters never lowers it.

use kiro_types::protocol::{CanonicalRequest, ContentBlock};

const REQUEST_OVERHEAD: u32 = 3;
const MESSAGE_OVERHEAD: u32 = 4;
const TOOL_OVERHEAD: u32 = 8;
/// Flat cost of one inline image.
const IMAGE_TOKENS: u32 = 1_600;

fn tokens_for_counts(ascii_chars: u64, other_chars: u64) -> u32 {
    let ascii_tokens = ascii_chars.div_ceil(4);
    let other_tokens = (other_chars * 2).div_ceil(3);
    let with_margin = ((ascii_tokens + other_tokens) * 115).div_ceil(100);
    u32::try_from(with_margin).unwrap_or(u32::MAX)
}

fn char_counts(s: &str) -> (u64, u64) {
    let mut ascii = 0u64;
    let mut other = 0u64;
    for c in s.chars() {
        if c.is_ascii() {
            ascii += 1;
        } else {
            other += 1;
        }
    }
    (ascii, other)
}

pub fn estimate_text_tokens(s: &str) -> u32 {
    if s.is_empty() {
        return 0;
    }
    let (ascii, other) = char_counts(s);
    tokens_for_counts(ascii, other)
}

fn estimate_block_tokens(block: &ContentBlock) -> u32 {
    match block {
        ContentBlock::Text { text } => estimate_text_tokens(text),
        ContentBlock::Image { .. } => IMAGE_TOKENS,
        ContentBlock::ToolUse { name, input, .. } => {
            estimate_text_tokens(name).saturating_add(estimate_text_tokens(&input.to_string()))
        },
        ContentBlock::ToolResult { content, .. } => estimate_text_tokens(content),
    }
}

/// Prompt-side estimate for a normalized request.
pub fn estimate_request_tokens(request: &CanonicalRequest) -> u32 {
    let mut total = REQUEST_OVERHEAD;
    if let Some(system) = &request.system {
        total = total.saturating_add(estimate_text_tokens(system));
    }
    for message in &request.messages {
        total = total.saturating_add(MESSAGE_OVERHEAD);
        for block in &message.content {
            total = total.saturating_add(estimate_block_tokens(block));
        }
    }
    for tool in &request.tools {
        total = total
            .saturating_add(TOOL_OVERHEAD)
            .saturating_add(estimate_text_tokens(&tool.name))
            .saturating_add(estimate_text_tokens(&tool.description))
            .saturating_add(estimate_text_tokens(&tool.input_schema.to_string()));
    }
    total
}

/// Running completion-side tally. Counts characters, not per-chunk
/// estimates, so the result does not depend on how the text was split.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenTally {
    ascii_chars: u64,
    other_chars: u64,
}

impl TokenTally {
    pub fn add(&mut self, text: &str) {
        let (ascii, other) = char_counts(text);
        self.ascii_chars += ascii;
        self.other_chars += other;
    }

    pub fn tokens(&self) -> u32 {
        if self.ascii_chars == 0 && self.other_chars == 0 {
            return 0;
        }
        tokens_for_counts(self.ascii_chars, self.other_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_types::protocol::{Message, ToolDefinition};
    use serde_json::json;

    #[test]
    fn test_empty_string() {
        assert_eq!(estimate_text_tokens(""), 0);
    }

    #[test]
    fn test_ascii_only() {
        // 11 chars -> 3 tokens -> 3.45 with margin -> 4
        assert_eq!(estimate_text_tokens("Hello World"), 4);
    }

    #[test]
    fn test_unicode_weighs_more_than_ascii() {
        assert!(estimate_text_tokens("你好世界") > estimate_text_tokens("abcd"));
    }

    #[test]
    fn test_monotonic_in_length() {
        let mut previous = 0;
        let mut text = String::new();
        for i in 0..200 {
            text.push(if i % 7 == 0 { 'é' } else { 'a' });
            let current = estimate_text_tokens(&text);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_tally_is_split_independent() {
        let mut tally = TokenTally::default();
        for piece in ["Hel", "lo ", "Wor", "ld"] {
            tally.add(piece);
        }
        assert_eq!(tally.tokens(), estimate_text_tokens("Hello World"));
        assert_eq!(TokenTally::default().tokens(), 0);
    }

    #[test]
    fn test_request_estimate_counts_tools_and_images() {
        let base = CanonicalRequest::new(
            "claude-sonnet-4-20250514",
            vec![Message::user(vec![ContentBlock::text("What is in this picture?")])],
        );
        let plain = estimate_request_tokens(&base);

        let mut with_image = base.clone();
        with_image.messages[0].content.push(ContentBlock::Image {
            media_type: "image/png".to_string(),
            data: "AAAA".to_string(),
        });
        assert_eq!(estimate_request_tokens(&with_image), plain + IMAGE_TOKENS);

        let mut with_tool = base.clone();
        with_tool.tools.push(ToolDefinition {
            name: "lookup".to_string(),
            description: "Look something up".to_string(),
            input_schema: json!({"type": "object"}),
        });
        assert!(estimate_request_tokens(&with_tool) > plain + TOOL_OVERHEAD);

        assert_eq!(estimate_request_tokens(&base), plain);
    }
}
