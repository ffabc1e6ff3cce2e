//! Upstream credential models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Selection status of a pooled credential.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Eligible for selection
    Active,
    /// Temporarily ineligible until `cooldown_until`
    CoolingDown,
    /// Rejected by upstream; never selected again
    Invalid,
    /// Administratively removed from rotation
    Disabled,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Active => write!(f, "active"),
            Self::CoolingDown => write!(f, "cooling_down"),
            Self::Invalid => write!(f, "invalid"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// How a leased credential's upstream call ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Success,
    AuthFailure,
    RateLimited,
    ServerError,
}

impl fmt::Display for ReleaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Success => write!(f, "success"),
            Self::AuthFailure => write!(f, "auth_failure"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServerError => write!(f, "server_error"),
        }
    }
}

/// Durable form of a credential as kept by the credential store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCredential {
    /// Stable identifier; derived from the secret when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Opaque upstream secret
    pub token: String,
    /// Administrative disable flag
    #[serde(default)]
    pub disabled: bool,
}

impl StoredCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self { id: None, token: token.into(), disabled: false }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Read-only status view of a pooled credential. The secret is masked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialView {
    pub id: String,
    pub masked_token: String,
    pub status: CredentialStatus,
    pub failure_count: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub in_flight: u32,
}
