//! OpenAI Chat Completions dialect (chat messages).

pub mod models;
pub mod request;
pub mod response;
pub mod streaming;

#[cfg(test)]
mod tests;

pub use request::{normalize_chat_request, render_chat_request};
pub use response::render_chat_response;
pub use streaming::OpenAIStreamEncoder;
