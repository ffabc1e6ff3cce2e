use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings file, credential set and data directory failures.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// The pool needs at least one credential
    #[error("no credentials configured")]
    EmptyCredentialSet,

    #[error("{path} does not exist")]
    NotFound { path: String },

    /// Settings or credentials JSON that does not deserialize
    #[error("cannot parse {source_name}: {message}")]
    ParseError { source_name: String, message: String },

    #[error("invalid {field}: {message}")]
    ValidationError { field: String, message: String },

    #[error("cannot write {path}: {message}")]
    WriteError { path: String, message: String },
}

impl ConfigError {
    pub fn parse(source_name: impl Into<String>, e: &serde_json::Error) -> Self {
        Self::ParseError { source_name: source_name.into(), message: e.to_string() }
    }

    pub fn write(path: &std::path::Path, e: &std::io::Error) -> Self {
        Self::WriteError { path: path.display().to_string(), message: e.to_string() }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError { field: field.into(), message: message.into() }
    }
}
