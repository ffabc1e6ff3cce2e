use std::path::PathBuf;

use kiro_types::error::ConfigError;

const DATA_DIR_ENV: &str = "KIRO_DATA_DIR";
const DEFAULT_DIR_NAME: &str = ".kiro-gateway";

/// Directory holding `settings.json` and `credentials.json`.
///
/// `KIRO_DATA_DIR` wins over `~/.kiro-gateway`. The directory is created on
/// first use.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .ok_or_else(|| ConfigError::NotFound { path: "home directory".to_string() })?
            .join(DEFAULT_DIR_NAME),
    };
    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::write(&dir, &e))?;
    Ok(dir)
}
