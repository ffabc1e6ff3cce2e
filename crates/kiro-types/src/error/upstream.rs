//! Upstream call errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ReleaseOutcome;

/// Errors from a single upstream call.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum UpstreamError {
    /// Connection, TLS or body transfer failed
    #[error("Upstream network error: {message}")]
    Network {
        /// Transport error description
        message: String,
    },

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Upstream body could not be decoded
    #[error("Malformed upstream response: {message}")]
    MalformedResponse {
        /// Decoder error description
        message: String,
    },

    /// Upstream reported an exception inside a successful response
    #[error("Upstream exception {kind}: {message}")]
    Exception {
        /// Exception type, e.g. `ThrottlingException`
        kind: String,
        /// Exception message
        message: String,
    },
    /// Upstream did not answer within the request deadline
    #[error("Upstream timed out after {duration_secs}s")]
    Timeout {
        /// Deadline that expired
        duration_secs: u64,
    },
}

impl UpstreamError {
    /// Whether the call may be retried against a different credential.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => {
                matches!(*status, 401 | 403 | 429) || (500..600).contains(status)
            },
            Self::Exception { kind, .. } => is_transient_exception(kind),
            Self::MalformedResponse { .. } => false,
        }
    }

    /// Outcome to report to the credential pool for the credential that made the call.
    pub fn release_outcome(&self) -> ReleaseOutcome {
        match self {
            Self::Status { status: 401 | 403, .. } => ReleaseOutcome::AuthFailure,
            Self::Status { status: 429, .. } => ReleaseOutcome::RateLimited,
            Self::Status { status, .. } if *status >= 500 => ReleaseOutcome::ServerError,
            // Request-shaped rejections are not the credential's fault
            Self::Status { .. } => ReleaseOutcome::Success,
            Self::Exception { kind, .. } if kind.contains("Throttling") => ReleaseOutcome::RateLimited,
            Self::Exception { kind, .. } if is_transient_exception(kind) => ReleaseOutcome::ServerError,
            Self::Exception { .. } => ReleaseOutcome::Success,
            Self::Network { .. } | Self::MalformedResponse { .. } | Self::Timeout { .. } => {
                ReleaseOutcome::ServerError
            },
        }
    }

    /// HTTP status surfaced to the client when this error ends a request.
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Status { status: 429, .. } => 429,
            Self::Status { status, .. } if (400..500).contains(status) && !matches!(*status, 401 | 403) => {
                *status
            },
            Self::Exception { kind, .. } if kind.contains("Throttling") => 429,
            Self::Exception { kind, .. } if kind.contains("Validation") => 400,
            Self::Timeout { .. } => 504,
            Self::Exception { .. }
            | Self::Status { .. }
            | Self::Network { .. }
            | Self::MalformedResponse { .. } => 502,
        }
    }
}

fn is_transient_exception(kind: &str) -> bool {
    ["Throttling", "ServiceUnavailable", "InternalServer"].iter().any(|k| kind.contains(k))
}
