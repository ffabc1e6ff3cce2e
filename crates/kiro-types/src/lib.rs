//! # Kiro Types
//!
//! Core types, models, and error definitions for Kiro Gateway.
//!
//! This crate provides the foundational type system for the gateway:
//!
//! - **`error`** - Typed error hierarchy for configuration, translation, pool and upstream failures
//! - **`models`** - Domain models (credentials, gateway configuration, stealth profile)
//! - **`protocol`** - The canonical request/response/stream-event representation
//!
//! Nothing here performs I/O. `kiro-core` builds the pool, translators and
//! transport on these types and `kiro-server` exposes them over HTTP. The
//! canonical protocol types are what both public dialects translate into,
//! and what the upstream request is built from.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::{ConfigError, GatewayError, PoolError, TranslationError, UpstreamError};

pub use models::{
    CredentialStatus, CredentialView, GatewayConfig, HeaderStrategy, Http2Mode, ReleaseOutcome,
    StealthProfile, StoredCredential,
};
pub use protocol::{CanonicalRequest, CanonicalResponse, Dialect, StreamEvent};
