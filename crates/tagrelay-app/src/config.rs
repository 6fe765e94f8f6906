//! Relay configuration.
//!
//! Configuration is read from a TOML file. Every section and field is
//! optional; missing values fall back to the defaults below.
//!
//! ```toml
//! [server]
//! host = "192.168.1.20"
//! port = 3000
//! connect_timeout_ms = 3000
//!
//! [server.reconnect]
//! policy = "backoff"      # or "manual" (default)
//! initial_delay_ms = 500
//! max_delay_ms = 30000
//! max_attempts = 5
//!
//! [reader]
//! felica_mode = "compatibility"   # or "idm"
//! resume_when_available = false
//!
//! [logging]
//! level = "info"
//! format = "compact"      # or "pretty"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tagrelay_core::Endpoint;
use tagrelay_core::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_FRAME_SIZE, DEFAULT_RECONNECT_INITIAL_DELAY_MS,
    DEFAULT_RECONNECT_MAX_ATTEMPTS, DEFAULT_RECONNECT_MAX_DELAY_MS,
};
use tagrelay_network::{ReconnectPolicy, TransportConfig};
use tagrelay_reader::ReaderConfig;
use thiserror::Error;

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when none is configured.
pub const DEFAULT_PORT: u32 = 3000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    InvalidEndpoint(#[from] tagrelay_core::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Complete relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub reader: ReaderConfig,
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that the type system does not.
    pub fn validate(&self) -> Result<()> {
        self.server.endpoint()?;

        if self.server.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let reconnect = &self.server.reconnect;
        if reconnect.policy == ReconnectKind::Backoff {
            if reconnect.initial_delay_ms == 0 {
                return Err(ConfigError::Invalid(
                    "server.reconnect.initial_delay_ms must be greater than 0".to_string(),
                ));
            }
            if reconnect.max_delay_ms < reconnect.initial_delay_ms {
                return Err(ConfigError::Invalid(format!(
                    "server.reconnect.max_delay_ms ({}) is below initial_delay_ms ({})",
                    reconnect.max_delay_ms, reconnect.initial_delay_ms
                )));
            }
            if reconnect.max_attempts == 0 {
                return Err(ConfigError::Invalid(
                    "server.reconnect.max_attempts must be greater than 0".to_string(),
                ));
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Remote server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Kept wider than `u16` so that out-of-range ports are reported, not
    /// rejected by the parser with a less useful message.
    pub port: u32,
    pub connect_timeout_ms: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ServerConfig {
    /// The configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEndpoint` for an empty host or a port above
    /// 65535.
    pub fn endpoint(&self) -> tagrelay_core::Result<Endpoint> {
        Endpoint::new(self.host.as_str(), self.port)
    }

    /// Transport settings derived from this section.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect: self.reconnect.policy(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectKind {
    #[default]
    Manual,
    Backoff,
}

/// `[server.reconnect]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub policy: ReconnectKind,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectKind::Manual,
            initial_delay_ms: DEFAULT_RECONNECT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
            max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        match self.policy {
            ReconnectKind::Manual => ReconnectPolicy::Manual,
            ReconnectKind::Backoff => ReconnectPolicy::Backoff {
                initial_delay: Duration::from_millis(self.initial_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                max_attempts: self.max_attempts,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
