//! Credential pool errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by credential pool commands.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum PoolError {
    /// No credential became eligible within the acquire wait
    #[error("Credential pool exhausted after waiting {waited_ms}ms")]
    Exhausted {
        /// How long the caller waited before giving up
        waited_ms: u64,
    },

    /// Admin command referenced an unknown credential
    #[error("Credential not found: {id}")]
    NotFound {
        /// Identifier that was looked up
        id: String,
    },
}
