//! Errors from the file-backed parts of the gateway: the credential store,
//! settings and logging setup. Request-path errors live in `kiro_types::error`.

use kiro_types::error::ConfigError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credentials file that is not valid JSON, or a set that cannot be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A global tracing subscriber was already installed.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

/// Serialized as the display message.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

pub type AppResult<T> = Result<T, AppError>;
