//! Network transport for the tag relay.
//!
//! This crate provides the [`TransportClient`]: one long-lived TCP link to
//! the relay server, with STX/ETX framing from `tagrelay-protocol`.
//!
//! # Components
//!
//! - **TransportClient**: connect/disconnect/send handle backed by one task
//! - **TransportEvents**: status changes and inbound messages, in order
//! - **ReconnectPolicy**: manual (default) or exponential backoff
//!
//! # Example
//!
//! ```no_run
//! use tagrelay_network::{ReconnectPolicy, TransportClient, TransportConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> tagrelay_network::Result<()> {
//! let config = TransportConfig {
//!     connect_timeout: Duration::from_millis(3000),
//!     reconnect: ReconnectPolicy::backoff(),
//!     ..TransportConfig::default()
//! };
//!
//! let (client, _events) = TransportClient::spawn(config);
//! client.connect("127.0.0.1", 3000)?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;

pub use client::{TransportClient, TransportEvent, TransportEvents};
pub use config::{ReconnectPolicy, TransportConfig};
pub use error::{Result, TransportError};
