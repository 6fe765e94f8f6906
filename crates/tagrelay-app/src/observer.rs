//! Outward notification contract.
//!
//! A [`RelayObserver`] is the consumer of everything the relay reports:
//! reader availability, connection status, inbound server messages and
//! discovered cards. The coordinator invokes it from a single task, so an
//! implementation never sees two notifications at once and sees them in the
//! order the underlying events happened.

use tagrelay_core::ReaderState;
use tokio::sync::mpsc;
use tracing::info;

/// Receiver of relay notifications.
///
/// These four methods are the only notifications the relay emits.
pub trait RelayObserver: Send + 'static {
    fn on_reader_state_changed(&mut self, state: ReaderState);

    fn on_connection_status_changed(&mut self, connected: bool);

    fn on_message_received(&mut self, text: &str);

    fn on_card_discovered(&mut self, card_type: &str, card_number: &str);
}

/// Observer that writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl RelayObserver for LoggingObserver {
    fn on_reader_state_changed(&mut self, state: ReaderState) {
        info!(%state, "Reader state changed");
    }

    fn on_connection_status_changed(&mut self, connected: bool) {
        info!(connected, "Connection status changed");
    }

    fn on_message_received(&mut self, text: &str) {
        info!(message = text, "Message from server");
    }

    fn on_card_discovered(&mut self, card_type: &str, card_number: &str) {
        info!(card_type, card_number, "Card discovered");
    }
}

/// Owned form of one observer notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayNotification {
    ReaderStateChanged(ReaderState),
    ConnectionStatusChanged(bool),
    MessageReceived(String),
    CardDiscovered {
        card_type: String,
        card_number: String,
    },
}

/// Observer that forwards notifications into a channel.
///
/// Useful when the consumer lives in another task, such as an operator
/// console or a test.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<RelayNotification>,
}

impl ChannelObserver {
    /// Create the observer and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RelayNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, notification: RelayNotification) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.sender.send(notification);
    }
}

impl RelayObserver for ChannelObserver {
    fn on_reader_state_changed(&mut self, state: ReaderState) {
        self.forward(RelayNotification::ReaderStateChanged(state));
    }

    fn on_connection_status_changed(&mut self, connected: bool) {
        self.forward(RelayNotification::ConnectionStatusChanged(connected));
    }

    fn on_message_received(&mut self, text: &str) {
        self.forward(RelayNotification::MessageReceived(text.to_string()));
    }

    fn on_card_discovered(&mut self, card_type: &str, card_number: &str) {
        self.forward(RelayNotification::CardDiscovered {
            card_type: card_type.to_string(),
            card_number: card_number.to_string(),
        });
    }
}

/// Fan a notification out to two observers, in order.
impl<A, B> RelayObserver for (A, B)
where
    A: RelayObserver,
    B: RelayObserver,
{
    fn on_reader_state_changed(&mut self, state: ReaderState) {
        self.0.on_reader_state_changed(state);
        self.1.on_reader_state_changed(state);
    }

    fn on_connection_status_changed(&mut self, connected: bool) {
        self.0.on_connection_status_changed(connected);
        self.1.on_connection_status_changed(connected);
    }

    fn on_message_received(&mut self, text: &str) {
        self.0.on_message_received(text);
        self.1.on_message_received(text);
    }

    fn on_card_discovered(&mut self, card_type: &str, card_number: &str) {
        self.0.on_card_discovered(card_type, card_number);
        self.1.on_card_discovered(card_type, card_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards_in_order() {
        let (mut observer, mut notifications) = ChannelObserver::new();

        observer.on_reader_state_changed(ReaderState::Available);
        observer.on_connection_status_changed(true);
        observer.on_card_discovered("TypeA", "04ABCDEF");
        observer.on_message_received("ok");

        assert_eq!(
            notifications.try_recv().unwrap(),
            RelayNotification::ReaderStateChanged(ReaderState::Available)
        );
        assert_eq!(
            notifications.try_recv().unwrap(),
            RelayNotification::ConnectionStatusChanged(true)
        );
        assert_eq!(
            notifications.try_recv().unwrap(),
            RelayNotification::CardDiscovered {
                card_type: "TypeA".to_string(),
                card_number: "04ABCDEF".to_string(),
            }
        );
        assert_eq!(
            notifications.try_recv().unwrap(),
            RelayNotification::MessageReceived("ok".to_string())
        );
        assert!(notifications.try_recv().is_err());
    }

    #[test]
    fn test_channel_observer_tolerates_dropped_receiver() {
        let (mut observer, notifications) = ChannelObserver::new();
        drop(notifications);
        observer.on_connection_status_changed(false);
    }

    #[test]
    fn test_pair_notifies_both() {
        let (first, mut first_rx) = ChannelObserver::new();
        let (second, mut second_rx) = ChannelObserver::new();
        let mut pair = (first, second);

        pair.on_message_received("hello");

        let expected = RelayNotification::MessageReceived("hello".to_string());
        assert_eq!(first_rx.try_recv().unwrap(), expected);
        assert_eq!(second_rx.try_recv().unwrap(), expected);
    }
}
