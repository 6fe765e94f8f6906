//! Transport client for the relay server.
//!
//! The client owns one TCP link to one server endpoint. All connection
//! state lives in a single task; the cloneable [`TransportClient`] handle
//! only posts requests to it, so `connect`, `disconnect` and `send` return
//! immediately and never block the caller.
//!
//! # Architecture
//!
//! ```text
//! TransportClient (handle, cloneable)
//!     │  connect / disconnect / shutdown ──► command queue ──┐
//!     │  send ───────────────────────────► outbound queue ───┤
//!     │  state() ◄──────────── watch ◄──────────────┐        ▼
//!     │                                     ┌──────────────────────┐
//!     │                                     │  Transport task      │──(TCP)──► Server
//!     │                                     │  Framed<FrameCodec>  │
//!     │                                     └──────────────────────┘
//!     ▼                                                │
//! TransportEvents ◄──── StatusChanged / MessageReceived┘
//! ```
//!
//! # Connection lifecycle
//!
//! - `Disconnected → Connecting` when a connect request is processed.
//! - `Connecting → Connected` on handshake success; `StatusChanged(true)`.
//! - Any state `→ Disconnected` on disconnect, failure or loss;
//!   `StatusChanged(false)` unless the client already was disconnected.
//!
//! With [`ReconnectPolicy::Manual`] a failure is final until the caller
//! connects again. With [`ReconnectPolicy::Backoff`] the client stays in
//! `Connecting` while it waits between attempts. A lost link reports
//! `StatusChanged(false)` once; running out of attempts afterwards, or a
//! disconnect during the retry cycle, does not report it again.
//!
//! # Example
//!
//! ```no_run
//! use tagrelay_network::{TransportClient, TransportConfig, TransportEvent};
//!
//! # async fn example() -> tagrelay_network::Result<()> {
//! let (client, mut events) = TransportClient::spawn(TransportConfig::default());
//! client.connect("192.168.0.100", 3000)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         TransportEvent::StatusChanged(true) => client.send("hello")?,
//!         TransportEvent::StatusChanged(false) => break,
//!         TransportEvent::MessageReceived(text) => println!("Received: {text}"),
//!     }
//! }
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tagrelay_core::{ConnectionState, Endpoint};
use tagrelay_protocol::{FrameCodec, ProtocolError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ReconnectPolicy, TransportConfig};
use crate::error::{Result, TransportError};

/// Time allowed for flushing and shutting down a link on close.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Notification emitted by the transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link came up (`true`) or went down (`false`).
    StatusChanged(bool),

    /// One complete inbound frame, in wire order.
    MessageReceived(String),
}

/// Receiver for transport notifications.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

type Link = Framed<TcpStream, FrameCodec>;
type ConnectAttempt = Pin<Box<dyn Future<Output = Result<TcpStream>> + Send>>;

/// Published link status.
///
/// `session` increases with every established link so that payloads
/// accepted for one link are never written to a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinkStatus {
    state: ConnectionState,
    session: u64,
}

#[derive(Debug)]
enum Command {
    Connect(Endpoint),
    Disconnect,
    Shutdown,
}

#[derive(Debug)]
struct Outbound {
    session: u64,
    payload: String,
}

/// Handle to the transport task.
///
/// Cloning the handle does not open another connection; all clones talk to
/// the same task.
#[derive(Debug, Clone)]
pub struct TransportClient {
    commands: mpsc::UnboundedSender<Command>,
    outbound: mpsc::UnboundedSender<Outbound>,
    status: watch::Receiver<LinkStatus>,
}

impl TransportClient {
    /// Start the transport task.
    ///
    /// Returns the client handle and the single receiver of its
    /// notifications. The task stops on [`shutdown`](Self::shutdown) or when
    /// every handle has been dropped.
    pub fn spawn(config: TransportConfig) -> (Self, TransportEvents) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(LinkStatus {
            state: ConnectionState::Disconnected,
            session: 0,
        });

        let task = TransportTask {
            config,
            commands: command_rx,
            outbound: outbound_rx,
            events: event_tx,
            status: status_tx,
            endpoint: None,
            attempt: None,
            retry: None,
            retries: 0,
            loss_reported: false,
            link: None,
        };
        tokio::spawn(task.run());

        let client = Self {
            commands: command_tx,
            outbound: outbound_tx,
            status: status_rx,
        };
        (client, event_rx)
    }

    /// Connect to `host:port`.
    ///
    /// The endpoint is validated here, before anything else happens. The
    /// outcome of the attempt is reported through
    /// [`TransportEvent::StatusChanged`], never returned.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidEndpoint` if the host is empty or the port
    ///   is above 65535; the connection state is left untouched.
    /// - `TransportError::Closed` if the client has been shut down.
    pub fn connect(&self, host: impl Into<String>, port: u32) -> Result<()> {
        let endpoint = Endpoint::new(host, port)?;
        self.connect_to(endpoint)
    }

    /// Connect to an already validated endpoint.
    ///
    /// No-op if the client is connecting or connected to the same endpoint.
    /// A different endpoint closes the current link first.
    pub fn connect_to(&self, endpoint: Endpoint) -> Result<()> {
        self.command(Command::Connect(endpoint))
    }

    /// Close any link or pending attempt. Idempotent.
    ///
    /// Payloads queued but not yet written are discarded.
    pub fn disconnect(&self) -> Result<()> {
        self.command(Command::Disconnect)
    }

    /// Queue a payload for the current link.
    ///
    /// Payloads are written in call order. Delivery is best effort: a link
    /// lost before the payload is written drops it.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NotConnected` unless the client is
    /// `Connected`. The connection state is never changed by this call.
    pub fn send(&self, payload: impl Into<String>) -> Result<()> {
        let status = *self.status.borrow();
        if !status.state.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.outbound
            .send(Outbound {
                session: status.session,
                payload: payload.into(),
            })
            .map_err(|_| TransportError::Closed)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Wait until the connection state satisfies `predicate`.
    ///
    /// Returns the matching state, or `TransportError::Closed` if the task
    /// stops first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(ConnectionState) -> bool,
    ) -> Result<ConnectionState> {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(|link| predicate(link.state))
            .await
            .map_err(|_| TransportError::Closed)?;
        Ok(matched.state)
    }

    /// Close the link and stop the task, waiting for it to finish.
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).is_ok() {
            self.commands.closed().await;
        }
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TransportError::Closed)
    }
}

/// State owned by the transport task.
struct TransportTask {
    config: TransportConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
    status: watch::Sender<LinkStatus>,
    /// Target of the current connection cycle.
    endpoint: Option<Endpoint>,
    attempt: Option<ConnectAttempt>,
    retry: Option<Pin<Box<Sleep>>>,
    retries: u32,
    /// The current retry cycle follows a lost link whose `false` was sent.
    loss_reported: bool,
    link: Option<Link>,
}

impl TransportTask {
    async fn run(mut self) {
        debug!(
            connect_timeout_ms = self.config.connect_timeout.as_millis() as u64,
            policy = ?self.config.reconnect,
            "Transport task started"
        );

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Connect(endpoint)) => self.connect(endpoint).await,
                    Some(Command::Disconnect) => {
                        if self.state() != ConnectionState::Disconnected {
                            info!("Disconnecting");
                        }
                        self.close().await;
                        self.endpoint = None;
                    }
                    Some(Command::Shutdown) | None => break,
                },

                result = finish_attempt(&mut self.attempt), if self.attempt.is_some() => {
                    self.attempt = None;
                    self.on_attempt_finished(result);
                }

                frame = next_frame(&mut self.link), if self.link.is_some() => {
                    self.on_frame(frame).await;
                }

                Some(outbound) = self.outbound.recv(), if self.link.is_some() => {
                    self.write(outbound).await;
                }

                () = wait_retry(&mut self.retry), if self.retry.is_some() => {
                    self.retry = None;
                    self.start_attempt();
                }
            }
        }

        self.close().await;
        debug!("Transport task stopped");
    }

    fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    async fn connect(&mut self, endpoint: Endpoint) {
        let busy = self.state() != ConnectionState::Disconnected;
        if busy && self.endpoint.as_ref() == Some(&endpoint) {
            debug!(%endpoint, state = %self.state(), "Already connecting or connected");
            return;
        }

        if busy {
            info!(%endpoint, "Switching to a different endpoint");
            self.close().await;
        }

        self.endpoint = Some(endpoint);
        self.retries = 0;
        self.start_attempt();
    }

    fn start_attempt(&mut self) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        info!(%endpoint, "Connecting to server");
        self.set_state(ConnectionState::Connecting);

        let timeout = self.config.connect_timeout;
        self.attempt = Some(Box::pin(async move {
            let target = endpoint.to_string();
            match tokio::time::timeout(
                timeout,
                TcpStream::connect((endpoint.host(), endpoint.port())),
            )
            .await
            {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(source)) => Err(TransportError::ConnectionFailed {
                    endpoint: target,
                    source,
                }),
                Err(_) => Err(TransportError::ConnectionTimeout {
                    endpoint: target,
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        }));
    }

    fn on_attempt_finished(&mut self, result: Result<TcpStream>) {
        match result {
            Ok(stream) => {
                // Card payloads are tiny; Nagle would hold them back.
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY: {} - latency may be impacted", e);
                }

                self.link = Some(Framed::new(
                    stream,
                    FrameCodec::with_max_frame_size(self.config.max_frame_size),
                ));
                self.retries = 0;
                self.loss_reported = false;

                let session = self.status.borrow().session + 1;
                self.status.send_replace(LinkStatus {
                    state: ConnectionState::Connected,
                    session,
                });
                if let Some(endpoint) = &self.endpoint {
                    info!(%endpoint, "Connected to server");
                }
                self.emit(TransportEvent::StatusChanged(true));
            }
            Err(error) => {
                error!(%error, "Connection attempt failed");
                if !self.schedule_retry() {
                    self.endpoint = None;
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
    }

    /// Arm the retry timer if the policy allows another attempt.
    fn schedule_retry(&mut self) -> bool {
        let Some(delay) = self.config.reconnect.retry_delay(self.retries + 1) else {
            if matches!(self.config.reconnect, ReconnectPolicy::Backoff { .. }) {
                warn!(attempts = self.retries, "Reconnect attempts exhausted");
            }
            return false;
        };

        self.retries += 1;
        info!(
            attempt = self.retries,
            delay_ms = delay.as_millis() as u64,
            "Retrying connection"
        );
        self.retry = Some(Box::pin(tokio::time::sleep(delay)));
        true
    }

    async fn on_frame(&mut self, frame: Option<std::result::Result<String, ProtocolError>>) {
        match frame {
            Some(Ok(message)) => {
                trace!(len = message.len(), "Received message from server");
                self.emit(TransportEvent::MessageReceived(message));
            }
            Some(Err(error)) => {
                warn!(%error, "Failed to decode message, dropping connection");
                self.connection_lost().await;
            }
            None => {
                warn!("Connection closed by server");
                self.connection_lost().await;
            }
        }
    }

    async fn write(&mut self, outbound: Outbound) {
        if outbound.session != self.status.borrow().session {
            debug!("Dropping payload queued for a previous connection");
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        trace!(len = outbound.payload.len(), "Sending message to server");
        if let Err(error) = link.send(outbound.payload).await {
            match error {
                ProtocolError::Io(_) => {
                    error!(%error, "Failed to send message, dropping connection");
                    self.connection_lost().await;
                }
                // The link is fine; only this payload is rejected.
                error => warn!(%error, "Payload rejected by codec"),
            }
        }
    }

    /// Handle a link that went away without being asked to.
    async fn connection_lost(&mut self) {
        self.close().await;
        if self.schedule_retry() {
            self.loss_reported = true;
            self.set_state(ConnectionState::Connecting);
        } else {
            self.endpoint = None;
        }
    }

    /// Drop the link, any attempt and any pending retry, and discard
    /// payloads that were not written.
    async fn close(&mut self) {
        self.attempt = None;
        self.retry = None;

        if let Some(mut link) = self.link.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, SinkExt::<String>::flush(&mut link)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Error flushing during close: {}", e),
                Err(_) => debug!("Flush timeout during close"),
            }

            let mut stream = link.into_inner();
            if let Err(e) = tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown()).await {
                debug!("Shutdown timeout during close: {}", e);
            }
        }

        let mut discarded = 0usize;
        while self.outbound.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "Discarded unsent payloads");
        }

        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.status.borrow().state;
        if previous == state {
            return;
        }

        self.status.send_modify(|link| link.state = state);
        debug!(from = %previous, to = %state, "Connection state changed");

        if state == ConnectionState::Disconnected {
            if std::mem::take(&mut self.loss_reported) {
                debug!("Link loss already reported");
            } else {
                self.emit(TransportEvent::StatusChanged(false));
            }
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            trace!("Transport event receiver dropped");
        }
    }
}

async fn finish_attempt(attempt: &mut Option<ConnectAttempt>) -> Result<TcpStream> {
    match attempt {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(link: &mut Option<Link>) -> Option<std::result::Result<String, ProtocolError>> {
    match link {
        Some(link) => link.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        let (client, _events) = TransportClient::spawn(TransportConfig::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_without_connect() {
        let (client, _events) = TransportClient::spawn(TransportConfig::default());
        assert!(matches!(
            client.send("payload"),
            Err(TransportError::NotConnected)
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_rejected_before_transition() {
        let (client, mut events) = TransportClient::spawn(TransportConfig::default());

        assert!(matches!(
            client.connect("", 8080),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            client.connect("localhost", 70000),
            Err(TransportError::InvalidEndpoint(_))
        ));

        client.shutdown().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_silent() {
        let (client, mut events) = TransportClient::spawn(TransportConfig::default());
        client.disconnect().unwrap();
        client.disconnect().unwrap();
        client.shutdown().await;

        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_commands_after_shutdown() {
        let (client, _events) = TransportClient::spawn(TransportConfig::default());
        client.shutdown().await;

        assert!(matches!(
            client.connect("localhost", 3000),
            Err(TransportError::Closed)
        ));
        assert!(matches!(client.disconnect(), Err(TransportError::Closed)));
    }
}
