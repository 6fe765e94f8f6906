//! Logging initialization.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and one
//! stdout layer:
//! - **compact**: one line per event, for services and journald
//! - **pretty**: multi-line output with source locations, for development
//!
//! `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, LogFormat, LoggingConfig};

/// Build the filter: `RUST_LOG` if set, otherwise the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.trim()))
        .map_err(|e| ConfigError::Invalid(format!("logging.level {:?}: {e}", config.level)))
}

/// Install the global subscriber.
///
/// Calling this again once a subscriber is installed has no effect.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if the level is not a valid filter
/// directive.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = env_filter(config)?;

    let installed = match config.format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact().with_target(true))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
    Ok(())
}
