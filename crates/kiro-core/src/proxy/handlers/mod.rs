// Handlers module - /v1 endpoint handlers

pub mod chat;
mod common;
pub mod messages;
pub mod models;

pub use common::error_response;
