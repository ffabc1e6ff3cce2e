//! Typed error definitions for Kiro Gateway.
//!
//! This module provides a structured error hierarchy with specific error types
//! for different domains. All errors are designed to be:
//!
//! - **Serializable** for API responses via serde
//! - **Displayable** for logging via Display trait
//! - **Matchable** for error handling logic via enum variants

mod config;
mod pool;
mod translation;
mod upstream;

pub use config::ConfigError;
pub use pool::PoolError;
pub use translation::TranslationError;
pub use upstream::UpstreamError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can end a gateway request before a response is produced.
///
/// Failures that happen after streaming has begun are never surfaced through
/// this type; they are reported to the client as a synthesized error event.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "domain", content = "error")]
pub enum GatewayError {
    /// Inbound request could not be normalized
    #[error("{0}")]
    Translation(#[from] TranslationError),

    /// No credential could be leased
    #[error("{0}")]
    Pool(#[from] PoolError),

    /// Upstream call failed and could not be retried
    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    /// Configuration problem detected while serving
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The request deadline expired before a response could be produced
    #[error("Request timed out after {duration_secs}s")]
    Timeout {
        /// Configured request deadline
        duration_secs: u64,
    },
}

impl GatewayError {
    /// Get HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Translation(_) => 400,
            Self::Pool(PoolError::Exhausted { .. }) => 503,
            Self::Pool(PoolError::NotFound { .. }) => 404,
            Self::Upstream(e) => e.http_status_code(),
            Self::Config(_) => 500,
            Self::Timeout { .. } => 504,
        }
    }

    /// Error `type` string used by the Anthropic error envelope.
    pub fn anthropic_error_type(&self) -> &'static str {
        match self {
            Self::Translation(_) => "invalid_request_error",
            Self::Pool(PoolError::Exhausted { .. }) => "overloaded_error",
            Self::Pool(PoolError::NotFound { .. }) => "not_found_error",
            Self::Timeout { .. } => "timeout_error",
            Self::Config(_) => "api_error",
            Self::Upstream(e) => match e.http_status_code() {
                429 => "rate_limit_error",
                504 => "timeout_error",
                404 => "not_found_error",
                400..=499 => "invalid_request_error",
                _ => "api_error",
            },
        }
    }

    /// Error `type` string used by the OpenAI error envelope.
    pub fn openai_error_type(&self) -> &'static str {
        openai_error_type_for(self.anthropic_error_type())
    }
}

/// Chat-dialect error type for a blocks-dialect error type.
pub fn openai_error_type_for(anthropic_type: &str) -> &'static str {
    match anthropic_type {
        "invalid_request_error" | "not_found_error" => "invalid_request_error",
        "overloaded_error" => "service_unavailable",
        "rate_limit_error" => "rate_limit_exceeded",
        "timeout_error" => "timeout",
        "authentication_error" => "authentication_error",
        _ => "api_error",
    }
}
