//! Protocol translation errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when an inbound request cannot be mapped onto the canonical model.
///
/// Always maps to HTTP 400 and is never retried.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum TranslationError {
    /// A field carries a value the gateway cannot honour without changing semantics
    #[error("Unsupported field '{field}': {reason}")]
    UnsupportedField {
        /// JSON path of the offending field
        field: String,
        /// Why it cannot be honoured
        reason: String,
    },

    /// The request body does not have the expected shape
    #[error("Malformed input: {reason}")]
    MalformedInput {
        /// Description of the shape violation
        reason: String,
    },
}

impl TranslationError {
    pub fn unsupported(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedField { field: field.into(), reason: reason.into() }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput { reason: reason.into() }
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(e: serde_json::Error) -> Self {
        Self::malformed(e.to_string())
    }
}
