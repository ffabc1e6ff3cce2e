//! Core domain models for Kiro Gateway.

mod config;
mod credential;

pub use config::{
    GatewayConfig, HeaderStrategy, Http2Mode, LoggingConfig, PoolConfig, ServerConfig,
    StealthProfile, UpstreamConfig,
};
pub use credential::{CredentialStatus, CredentialView, ReleaseOutcome, StoredCredential};
