//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{RagError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `logging.level`. Fails if a subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            RagError::Configuration(format!("Invalid log level {}: {}", config.level, e))
        })?;

    let installed = match config.format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    installed
        .map_err(|e| RagError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
