//! Tracing subscriber setup.
//!
//! Console output always; an additional daily-rotated file layer when
//! `logging.file` names a directory.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use kiro_types::models::LoggingConfig;

use crate::error::{AppError, AppResult};

const LOG_FILE_PREFIX: &str = "kiro-gateway.log";

/// `RUST_LOG` wins over the configured level.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &LoggingConfig) -> AppResult<Option<WorkerGuard>> {
    let console = fmt::layer().with_target(false).with_filter(build_filter(config));

    let (file_layer, guard) = match config.file.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(dir) => {
            let dir = Path::new(dir);
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(build_filter(config));
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;

    if let Some(dir) = config.file.as_deref().filter(|_| guard.is_some()) {
        tracing::info!("📝 Writing logs to {}/{}.*", dir, LOG_FILE_PREFIX);
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_falls_back_to_info() {
        let config = LoggingConfig { level: "[[not a filter".to_string(), file: None };
        // Only checks that construction does not panic.
        let _ = build_filter(&config);
    }
}
