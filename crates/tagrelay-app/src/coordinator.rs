//! Glue between the reader side and the transport.
//!
//! The coordinator is the only place where the two subsystems meet. It runs
//! as one task that:
//! - forwards every discovered card to the observer, then to the server
//! - republishes transport status and inbound messages unchanged
//! - republishes reader state changes unchanged
//!
//! That task is also the delivery context for every observer call.
//!
//! ```text
//! ReaderSessionController ──► ReaderNotification ──┐
//!                                                  ▼
//!                                         ┌──────────────────┐ ──► RelayObserver
//!                                         │ RelayCoordinator │
//!                                         └──────────────────┘ ──► TransportClient::send
//!                                                  ▲
//! TransportClient ─────────► TransportEvent ───────┘
//! ```
//!
//! Cards are never buffered: a card read while the transport is not
//! connected is reported to the observer, logged as a relay warning and
//! dropped.

use tagrelay_core::CardRecord;
use tagrelay_network::{TransportClient, TransportError, TransportEvent, TransportEvents};
use tagrelay_protocol::CardPayload;
use tagrelay_reader::ReaderNotification;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::observer::RelayObserver;

/// Forwards reader notifications to the transport and everything to an
/// observer.
pub struct RelayCoordinator<O> {
    reader_events: mpsc::Receiver<ReaderNotification>,
    transport_events: TransportEvents,
    transport: TransportClient,
    observer: O,
}

impl<O: RelayObserver> RelayCoordinator<O> {
    pub fn new(
        reader_events: mpsc::Receiver<ReaderNotification>,
        transport: TransportClient,
        transport_events: TransportEvents,
        observer: O,
    ) -> Self {
        Self {
            reader_events,
            transport_events,
            transport,
            observer,
        }
    }

    /// Run the coordinator on its own task.
    ///
    /// The task ends once both the reader controller and the transport
    /// have stopped, and hands the observer back.
    pub fn spawn(self) -> JoinHandle<O> {
        tokio::spawn(self.run())
    }

    /// Process notifications until both sources are closed.
    pub async fn run(mut self) -> O {
        let mut reader_open = true;
        let mut transport_open = true;

        while reader_open || transport_open {
            tokio::select! {
                notification = self.reader_events.recv(), if reader_open => match notification {
                    Some(notification) => self.on_reader_notification(notification),
                    None => {
                        debug!("Reader notifications closed");
                        reader_open = false;
                    }
                },

                event = self.transport_events.recv(), if transport_open => match event {
                    Some(event) => self.on_transport_event(event),
                    None => {
                        debug!("Transport events closed");
                        transport_open = false;
                    }
                },
            }
        }

        debug!("Relay coordinator stopped");
        self.observer
    }

    fn on_reader_notification(&mut self, notification: ReaderNotification) {
        match notification {
            ReaderNotification::ReaderStateChanged(state) => {
                self.observer.on_reader_state_changed(state);
            }
            ReaderNotification::CardDiscovered { record, .. } => self.relay_card(&record),
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StatusChanged(connected) => {
                self.observer.on_connection_status_changed(connected);
            }
            TransportEvent::MessageReceived(text) => {
                trace!(len = text.len(), "Relaying inbound message");
                self.observer.on_message_received(&text);
            }
        }
    }

    /// Report a card, then send it to the server.
    fn relay_card(&mut self, record: &CardRecord) {
        self.observer
            .on_card_discovered(record.card_type(), record.card_number().as_str());

        let payload = match CardPayload::from(record).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(card_type = record.card_type(), error = %e, "Failed to encode card");
                return;
            }
        };

        match self.transport.send(payload) {
            Ok(()) => debug!(card_type = record.card_type(), "Card sent to server"),
            Err(TransportError::NotConnected) => warn!(
                card_type = record.card_type(),
                card_number = record.card_number().as_str(),
                "Not connected to server, card dropped"
            ),
            Err(e) => warn!(card_type = record.card_type(), error = %e, "Failed to send card"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ChannelObserver, RelayNotification};
    use chrono::Utc;
    use tagrelay_core::{CardNumber, ReaderState};
    use tagrelay_network::TransportConfig;

    fn record(number: &str) -> CardRecord {
        CardRecord::new("TypeA", CardNumber::new(number).unwrap())
    }

    #[tokio::test]
    async fn test_card_reported_while_disconnected() {
        let (reader_tx, reader_rx) = mpsc::channel(8);
        let (transport, transport_events) = TransportClient::spawn(TransportConfig::default());
        let (observer, mut notifications) = ChannelObserver::new();

        let task = RelayCoordinator::new(reader_rx, transport.clone(), transport_events, observer)
            .spawn();

        reader_tx
            .send(ReaderNotification::ReaderStateChanged(ReaderState::Available))
            .await
            .unwrap();
        reader_tx
            .send(ReaderNotification::CardDiscovered {
                record: record("04ABCDEF"),
                discovered_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(
            notifications.recv().await.unwrap(),
            RelayNotification::ReaderStateChanged(ReaderState::Available)
        );
        assert_eq!(
            notifications.recv().await.unwrap(),
            RelayNotification::CardDiscovered {
                card_type: "TypeA".to_string(),
                card_number: "04ABCDEF".to_string(),
            }
        );

        drop(reader_tx);
        transport.shutdown().await;
        task.await.unwrap();
        assert!(notifications.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stops_when_sources_close() {
        let (reader_tx, reader_rx) = mpsc::channel(1);
        let (transport, transport_events) = TransportClient::spawn(TransportConfig::default());
        let (observer, _notifications) = ChannelObserver::new();

        let task = RelayCoordinator::new(reader_rx, transport.clone(), transport_events, observer)
            .spawn();

        transport.shutdown().await;
        assert!(!task.is_finished());

        drop(reader_tx);
        task.await.unwrap();
    }
}
