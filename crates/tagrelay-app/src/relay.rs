//! Composition root.
//!
//! [`Relay`] builds and owns the one reader controller, the one transport
//! client and the coordinator joining them. Nothing here is global: the
//! binary creates a single `Relay` and hands out references to its parts.

use tagrelay_core::Endpoint;
use tagrelay_network::{TransportClient, TransportError};
use tagrelay_reader::{ReaderHandle, ReaderSessionController};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{RelayConfig, Result};
use crate::coordinator::RelayCoordinator;
use crate::observer::RelayObserver;

/// Running relay.
#[derive(Debug)]
pub struct Relay<O> {
    reader: ReaderHandle,
    transport: TransportClient,
    endpoint: Endpoint,
    coordinator: JoinHandle<O>,
}

impl<O: RelayObserver> Relay<O> {
    /// Start every component.
    ///
    /// The transport stays disconnected until [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration does not validate.
    pub fn start(config: &RelayConfig, observer: O) -> Result<Self> {
        config.validate()?;
        let endpoint = config.server.endpoint()?;

        let (reader, reader_events) = ReaderSessionController::spawn(config.reader);
        let (transport, transport_events) =
            TransportClient::spawn(config.server.transport_config());
        let coordinator =
            RelayCoordinator::new(reader_events, transport.clone(), transport_events, observer)
                .spawn();

        info!(%endpoint, felica_mode = ?config.reader.felica_mode, "Relay started");

        Ok(Self {
            reader,
            transport,
            endpoint,
            coordinator,
        })
    }

    /// Handle for hardware sources and the session lifecycle.
    pub fn reader(&self) -> &ReaderHandle {
        &self.reader
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    /// Endpoint used by [`connect`](Self::connect).
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Replace the configured endpoint. Takes effect on the next connect.
    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = endpoint;
    }

    /// Connect to the configured endpoint.
    pub fn connect(&self) -> std::result::Result<(), TransportError> {
        self.transport.connect_to(self.endpoint.clone())
    }

    pub fn disconnect(&self) -> std::result::Result<(), TransportError> {
        self.transport.disconnect()
    }

    /// Stop every component and return the observer.
    ///
    /// Notifications produced while shutting down, such as the final
    /// connection status, are still delivered.
    pub async fn shutdown(self) -> Option<O> {
        self.reader.shutdown().await;
        self.transport.shutdown().await;

        match self.coordinator.await {
            Ok(observer) => {
                info!("Relay stopped");
                Some(observer)
            }
            Err(e) => {
                warn!(error = %e, "Relay coordinator ended abnormally");
                None
            }
        }
    }
}
