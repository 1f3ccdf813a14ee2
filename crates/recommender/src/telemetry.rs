//! Structured logging setup for the service binary

use crate::error::RecError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = RecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(RecError::Configuration {
                message: format!("Invalid log format '{}'. Must be one of: json, pretty", other),
                key: Some("BOOKREC_LOG_FORMAT".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "bookrec_engine=debug"
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LogConfig {
    /// - `BOOKREC_LOG_LEVEL` or `RUST_LOG`: filter directive (default: "info")
    /// - `BOOKREC_LOG_FORMAT`: "json" or "pretty" (default: "json")
    pub fn from_env() -> Result<Self, RecError> {
        let level = std::env::var("BOOKREC_LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let format = match std::env::var("BOOKREC_LOG_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) => LogFormat::Json,
        };

        Ok(Self { level, format })
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), RecError> {
    let env_filter = EnvFilter::try_new(&config.level)
        .map_err(|e| RecError::Logging(format!("invalid filter '{}': {}", config.level, e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init(),
    };
    result.map_err(|e| RecError::Logging(e.to_string()))?;

    tracing::info!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}
