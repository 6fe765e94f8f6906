//! Tag relay application.
//!
//! Wires the reader side and the transport together and exposes the result
//! to an operator surface:
//!
//! - [`RelayCoordinator`] forwards discovered cards to the server and
//!   republishes every event to a [`RelayObserver`].
//! - [`Relay`] is the composition root owning all running components.
//! - [`RelayConfig`] is the TOML configuration; [`logging`] installs the
//!   tracing subscriber.
//! - [`console`] parses the operator commands of the `tagrelay` binary.

pub mod config;
pub mod console;
pub mod coordinator;
pub mod logging;
pub mod observer;
pub mod relay;

pub use config::{ConfigError, LogFormat, LoggingConfig, RelayConfig, ServerConfig};
pub use coordinator::RelayCoordinator;
pub use observer::{ChannelObserver, LoggingObserver, RelayNotification, RelayObserver};
pub use relay::Relay;
