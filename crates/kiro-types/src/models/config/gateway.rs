//! Gateway configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::enums::{HeaderStrategy, Http2Mode};

/// Immutable gateway configuration.
///
/// Built once at startup (file + environment overrides) and replaced
/// wholesale when settings are saved; never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    pub stealth: StealthProfile,
    #[validate(nested)]
    pub pool: PoolConfig,
    #[validate(nested)]
    pub upstream: UpstreamConfig,
    pub logging: LoggingConfig,
    /// Deadline for one inbound request, streaming included
    #[validate(range(min = 5_u64, max = 3600_u64))]
    pub request_timeout_secs: u64,
    /// Retries against a different credential after a retryable upstream failure
    #[validate(range(max = 3_u32))]
    pub max_retries: u32,
    /// Tool descriptions longer than this are truncated before going upstream
    #[validate(range(min = 1_usize))]
    pub max_tool_description_length: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            stealth: StealthProfile::default(),
            pool: PoolConfig::default(),
            upstream: UpstreamConfig::default(),
            logging: LoggingConfig::default(),
            request_timeout_secs: 300,
            max_retries: 1,
            max_tool_description_length: 10_000,
        }
    }
}

/// Listener and client-auth settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1_u64))]
    pub host: String,
    #[validate(range(min = 1_u16))]
    pub port: u16,
    /// Key clients present via `Authorization: Bearer` or `x-api-key`
    #[validate(length(min = 1_u64))]
    pub client_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080, client_token: String::new() }
    }
}

/// Outbound connection shaping, fixed for the lifetime of one upstream call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(default)]
pub struct StealthProfile {
    pub header_strategy: HeaderStrategy,
    pub http2_mode: Http2Mode,
}

/// Credential pool tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct PoolConfig {
    /// How long `acquire` waits for a credential before reporting exhaustion
    #[validate(range(max = 60_000_u64))]
    pub acquire_wait_ms: u64,
    /// First rate-limit cooldown; doubles per consecutive failure
    #[validate(range(min = 1_u64))]
    pub rate_limit_base_secs: u64,
    /// Upper bound for the rate-limit cooldown
    #[validate(range(min = 1_u64))]
    pub rate_limit_max_secs: u64,
    /// Consecutive server errors before a credential is cooled down
    #[validate(range(min = 1_u32))]
    pub server_error_threshold: u32,
    pub server_error_cooldown_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            acquire_wait_ms: 2_000,
            rate_limit_base_secs: 5,
            rate_limit_max_secs: 300,
            server_error_threshold: 3,
            server_error_cooldown_secs: 15,
        }
    }
}

/// Upstream endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct UpstreamConfig {
    #[validate(url)]
    pub base_url: String,
    /// Optional profile ARN forwarded with every request
    pub profile_arn: Option<String>,
    #[validate(range(min = 1_u64, max = 120_u64))]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://codewhisperer.us-east-1.amazonaws.com".to_string(),
            profile_arn: None,
            connect_timeout_secs: 10,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
    /// Directory for daily-rotated log files; console only when unset
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}
