//! Gateway configuration: file loading, environment overrides, validation,
//! atomic persistence and the swap-on-save handle shared by request handlers.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use validator::Validate;

use kiro_types::error::ConfigError;
use kiro_types::models::{GatewayConfig, HeaderStrategy, Http2Mode};

use crate::utils::paths::data_dir;
use crate::utils::redact::mask_secret;

const CONFIG_FILE: &str = "settings.json";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Keys accepted both as environment variables and by the settings API.
pub const SETTING_KEYS: &[&str] = &[
    "KIRO_CLIENT_TOKEN",
    "HOST",
    "PORT",
    "STEALTH_MODE",
    "HEADER_STRATEGY",
    "STEALTH_HTTP2_MODE",
    "LOG_LEVEL",
    "LOG_FILE",
    "MAX_TOOL_DESCRIPTION_LENGTH",
    "REQUEST_TIMEOUT_SECS",
    "MAX_RETRIES",
    "ACQUIRE_WAIT_MS",
    "KIRO_UPSTREAM_URL",
    "KIRO_PROFILE_ARN",
];

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    data_file(CONFIG_FILE)
}

pub fn default_credentials_path() -> Result<PathBuf, ConfigError> {
    data_file(CREDENTIALS_FILE)
}

fn data_file(name: &str) -> Result<PathBuf, ConfigError> {
    data_dir().map(|dir| dir.join(name))
}

/// Load configuration from `path` (defaults when the file does not exist),
/// apply process environment overrides and validate.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let mut config = read_config_file(path)?;
    let applied = apply_overrides(&mut config, &|key: &str| std::env::var(key).ok())?;
    if !applied.is_empty() {
        tracing::debug!("Environment overrides applied: {}", applied.join(", "));
    }
    validate_config(&config)?;
    Ok(config)
}

pub fn read_config_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    if !path.exists() {
        tracing::info!("No settings file at {}, using defaults", path.display());
        return Ok(GatewayConfig::default());
    }
    let content = fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
        source_name: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::parse(path.display().to_string(), &e))
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), ConfigError> {
    config.validate().map_err(|e| ConfigError::invalid("settings", e.to_string().replace('\n', "; ")))
}

/// Atomically write configuration (temp file + rename).
pub fn save_config(path: &Path, config: &GatewayConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config).map_err(|e| ConfigError::parse("settings", &e))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::write(parent, &e))?;
    }
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content).map_err(|e| ConfigError::write(&temp_path, &e))?;
    fs::rename(&temp_path, path).map_err(|e| ConfigError::write(path, &e))
}

/// Apply `KEY=value` overrides from `lookup`. Returns the keys that were applied.
pub fn apply_overrides(
    config: &mut GatewayConfig,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<&'static str>, ConfigError> {
    let mut applied = Vec::new();
    for &key in SETTING_KEYS {
        let Some(raw) = lookup(key) else { continue };
        let value = raw.trim();
        match key {
            "KIRO_CLIENT_TOKEN" => config.server.client_token = value.to_string(),
            "HOST" => config.server.host = value.to_string(),
            "PORT" => config.server.port = parse_number(key, value)?,
            "HEADER_STRATEGY" => config.stealth.header_strategy = HeaderStrategy::from_string(value),
            "STEALTH_HTTP2_MODE" => config.stealth.http2_mode = Http2Mode::from_string(value),
            "LOG_LEVEL" => config.logging.level = value.to_string(),
            "LOG_FILE" => config.logging.file = non_empty(value),
            "MAX_TOOL_DESCRIPTION_LENGTH" => {
                config.max_tool_description_length = parse_number(key, value)?;
            },
            "REQUEST_TIMEOUT_SECS" => config.request_timeout_secs = parse_number(key, value)?,
            "MAX_RETRIES" => config.max_retries = parse_number(key, value)?,
            "ACQUIRE_WAIT_MS" => config.pool.acquire_wait_ms = parse_number(key, value)?,
            "KIRO_UPSTREAM_URL" => config.upstream.base_url = value.to_string(),
            "KIRO_PROFILE_ARN" => config.upstream.profile_arn = non_empty(value),
            // Handled below so it wins over HEADER_STRATEGY
            "STEALTH_MODE" => {},
            _ => continue,
        }
        applied.push(key);
    }

    if let Some(raw) = lookup("STEALTH_MODE") {
        if !parse_bool("STEALTH_MODE", &raw)? {
            config.stealth.header_strategy = HeaderStrategy::Off;
        }
    }
    Ok(applied)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("expected a boolean, got '{}'", other))),
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Flat settings view for the admin API. The client token is masked.
pub fn to_settings_map(config: &GatewayConfig) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut put = |k: &str, v: String| {
        map.insert(k.to_string(), v);
    };
    put("KIRO_CLIENT_TOKEN", mask_secret(&config.server.client_token));
    put("HOST", config.server.host.clone());
    put("PORT", config.server.port.to_string());
    put(
        "STEALTH_MODE",
        (config.stealth.header_strategy != HeaderStrategy::Off).to_string(),
    );
    put("HEADER_STRATEGY", config.stealth.header_strategy.to_string());
    put("STEALTH_HTTP2_MODE", config.stealth.http2_mode.to_string());
    put("LOG_LEVEL", config.logging.level.clone());
    put("LOG_FILE", config.logging.file.clone().unwrap_or_default());
    put("MAX_TOOL_DESCRIPTION_LENGTH", config.max_tool_description_length.to_string());
    put("REQUEST_TIMEOUT_SECS", config.request_timeout_secs.to_string());
    put("MAX_RETRIES", config.max_retries.to_string());
    put("ACQUIRE_WAIT_MS", config.pool.acquire_wait_ms.to_string());
    put("KIRO_UPSTREAM_URL", config.upstream.base_url.clone());
    put("KIRO_PROFILE_ARN", config.upstream.profile_arn.clone().unwrap_or_default());
    map
}

/// Result of applying a settings update.
#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    pub config: GatewayConfig,
    /// Listener settings changed; takes effect after a restart
    pub restart_required: bool,
}

/// Apply a settings map on top of `current`. Unknown keys are rejected; a
/// masked client token (anything containing `*`) keeps the current token.
pub fn apply_settings(
    current: &GatewayConfig,
    updates: &BTreeMap<String, String>,
) -> Result<SettingsUpdate, ConfigError> {
    if let Some(unknown) = updates.keys().find(|k| !SETTING_KEYS.contains(&k.as_str())) {
        return Err(ConfigError::invalid(unknown.as_str(), "unknown setting"));
    }

    let mut next = current.clone();
    apply_overrides(&mut next, &|key: &str| {
        let value = updates.get(key)?;
        if key == "KIRO_CLIENT_TOKEN" && value.contains('*') {
            return None;
        }
        Some(value.clone())
    })?;
    validate_config(&next)?;

    let restart_required =
        next.server.host != current.server.host || next.server.port != current.server.port;
    Ok(SettingsUpdate { config: next, restart_required })
}

/// Shared, atomically swapped configuration.
///
/// Readers take an `Arc` snapshot per request; a save replaces the whole
/// value so in-flight requests keep the configuration they started with.
pub struct ConfigHandle {
    current: RwLock<Arc<GatewayConfig>>,
    path: Option<PathBuf>,
}

impl ConfigHandle {
    pub fn new(config: GatewayConfig, path: Option<PathBuf>) -> Self {
        Self { current: RwLock::new(Arc::new(config)), path }
    }

    pub fn snapshot(&self) -> Arc<GatewayConfig> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, config: GatewayConfig) {
        *self.current.write() = Arc::new(config);
    }

    /// Settings file backing this handle, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_apply_typed_values() {
        let mut config = GatewayConfig::default();
        let lookup = lookup_from(&[
            ("KIRO_CLIENT_TOKEN", "client-key"),
            ("PORT", "9123"),
            ("STEALTH_HTTP2_MODE", "force_h1"),
            ("MAX_TOOL_DESCRIPTION_LENGTH", "512"),
            ("KIRO_PROFILE_ARN", ""),
        ]);
        let applied = apply_overrides(&mut config, &lookup).unwrap();

        assert!(applied.contains(&"PORT"));
        assert_eq!(config.server.client_token, "client-key");
        assert_eq!(config.server.port, 9123);
        assert_eq!(config.stealth.http2_mode, Http2Mode::ForceH1);
        assert_eq!(config.max_tool_description_length, 512);
        assert_eq!(config.upstream.profile_arn, None);
    }

    #[test]
    fn test_stealth_mode_false_wins_over_header_strategy() {
        let mut config = GatewayConfig::default();
        let lookup =
            lookup_from(&[("HEADER_STRATEGY", "real_simulation"), ("STEALTH_MODE", "false")]);
        apply_overrides(&mut config, &lookup).unwrap();
        assert_eq!(config.stealth.header_strategy, HeaderStrategy::Off);
    }

    #[test]
    fn test_bad_number_is_a_validation_error() {
        let mut config = GatewayConfig::default();
        let err = apply_overrides(&mut config, &lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "PORT"));
    }

    #[test]
    fn test_settings_map_masks_client_token() {
        let mut config = GatewayConfig::default();
        config.server.client_token = "super-secret-client-token".to_string();
        let map = to_settings_map(&config);
        assert_eq!(map["KIRO_CLIENT_TOKEN"], "********oken");
        assert_eq!(map["HEADER_STRATEGY"], "real_simulation");
    }

    #[test]
    fn test_apply_settings_keeps_token_when_masked_and_flags_restart() {
        let mut current = GatewayConfig::default();
        current.server.client_token = "original-token".to_string();

        let mut updates = to_settings_map(&current);
        updates.insert("PORT".to_string(), "9999".to_string());
        updates.insert("LOG_LEVEL".to_string(), "debug".to_string());

        let update = apply_settings(&current, &updates).unwrap();
        assert_eq!(update.config.server.client_token, "original-token");
        assert_eq!(update.config.logging.level, "debug");
        assert!(update.restart_required);
    }

    #[test]
    fn test_apply_settings_rejects_unknown_key() {
        let current = GatewayConfig::default();
        let mut updates = BTreeMap::new();
        updates.insert("NOT_A_SETTING".to_string(), "1".to_string());
        assert!(apply_settings(&current, &updates).is_err());
    }

    #[test]
    fn test_save_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut config = GatewayConfig::default();
        config.server.client_token = "abc".to_string();
        config.stealth.http2_mode = Http2Mode::ForceH2;

        save_config(&path, &config).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(read_config_file(&path).unwrap(), config);
    }

    #[test]
    fn test_handle_swaps_without_touching_old_snapshots() {
        let handle = ConfigHandle::new(GatewayConfig::default(), None);
        let before = handle.snapshot();

        let mut next = (*before).clone();
        next.max_retries = 0;
        handle.replace(next);

        assert_eq!(before.max_retries, 1);
        assert_eq!(handle.snapshot().max_retries, 0);
    }
}
