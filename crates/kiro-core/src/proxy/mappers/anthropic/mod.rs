//! Anthropic Messages dialect (content blocks).

pub mod models;
pub mod request;
pub mod response;
pub mod streaming;


pub use request::{normalize_messages_request, render_messages_request};
pub use response::render_messages_response;
pub use streaming::AnthropicStreamEncoder;
