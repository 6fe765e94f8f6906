//! Reader session controller task.
//!
//! The controller owns a [`ReaderSession`] and a [`CardDecoder`] inside a
//! single tokio task. Everything that touches the session goes through one
//! command queue, so hardware broadcasts, tags and lifecycle requests are
//! handled strictly one after another.
//!
//! ```text
//! ┌──────────────┐  HardwareStateChanged   ┌──────────────────┐
//! │ Hardware     │  RawTagAvailable        │                  │  ReaderNotification
//! │ (mock/pcsc)  │────────────────────────►│  Controller task │───────────────────►
//! └──────────────┘                         │  (mpsc queue)    │
//! ┌──────────────┐  EnableSession          │                  │
//! │ Lifecycle    │  DisableSession         │                  │
//! │              │────────────────────────►│                  │
//! └──────────────┘                         └──────────────────┘
//! ```
//!
//! Decoding may block on tag I/O and runs on the blocking pool. The
//! controller awaits it before taking the next command.
//!
//! # Examples
//!
//! ```
//! use tagrelay_core::ReaderState;
//! use tagrelay_reader::{RawTag, ReaderConfig, ReaderNotification, ReaderSessionController, Technology};
//!
//! #[tokio::main]
//! async fn main() -> tagrelay_reader::Result<()> {
//!     let (reader, mut notifications) = ReaderSessionController::spawn(ReaderConfig::default());
//!
//!     reader.hardware_state_changed(ReaderState::Available).await?;
//!     reader.enable_session().await?;
//!     reader
//!         .raw_tag_available(RawTag::new(vec![0x04, 0xAB, 0xCD, 0xEF], vec![Technology::TypeA]))
//!         .await?;
//!
//!     assert_eq!(
//!         notifications.recv().await,
//!         Some(ReaderNotification::ReaderStateChanged(ReaderState::Available))
//!     );
//!     match notifications.recv().await {
//!         Some(ReaderNotification::CardDiscovered { record, .. }) => {
//!             assert_eq!(record.card_number().as_str(), "04ABCDEF");
//!         }
//!         other => panic!("unexpected notification: {other:?}"),
//!     }
//!
//!     reader.shutdown().await;
//!     Ok(())
//! }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tagrelay_core::ReaderState;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::decoder::{CardDecoder, FelicaMode};
use crate::session::{ReaderNotification, ReaderSession};
use crate::tag::RawTag;
use crate::{HardwareError, Result};

/// Capacity of the command queue.
const COMMAND_BUFFER: usize = 32;

/// Capacity of the notification channel.
const NOTIFICATION_BUFFER: usize = 100;

/// Name used in errors when the controller task is gone.
const CONTROLLER_NAME: &str = "reader session controller";

/// Reader side configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Rendering of FeliCa identifiers.
    pub felica_mode: FelicaMode,

    /// Apply an enable request made while unavailable once the reader is up.
    pub resume_when_available: bool,
}

/// Commands accepted by the controller.
#[derive(Debug)]
pub enum ReaderCommand {
    HardwareStateChanged(ReaderState),
    RawTagAvailable(RawTag),
    EnableSession,
    DisableSession,
    Shutdown,
}

/// Latest session state, readable without going through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSnapshot {
    pub state: ReaderState,
    pub session_enabled: bool,
}

/// Cloneable handle to a running controller.
///
/// Hardware sources call [`hardware_state_changed`](Self::hardware_state_changed)
/// and [`raw_tag_available`](Self::raw_tag_available); the surrounding
/// lifecycle calls [`enable_session`](Self::enable_session) and
/// [`disable_session`](Self::disable_session).
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    commands: mpsc::Sender<ReaderCommand>,
    snapshot: watch::Receiver<ReaderSnapshot>,
}

impl ReaderHandle {
    /// Queue a command for the controller.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Disconnected` if the controller has stopped.
    pub async fn dispatch(&self, command: ReaderCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HardwareError::disconnected(CONTROLLER_NAME))
    }

    /// Queue a command from a thread outside the runtime.
    ///
    /// Must not be called from within an async context.
    pub fn blocking_dispatch(&self, command: ReaderCommand) -> Result<()> {
        self.commands
            .blocking_send(command)
            .map_err(|_| HardwareError::disconnected(CONTROLLER_NAME))
    }

    pub async fn hardware_state_changed(&self, state: ReaderState) -> Result<()> {
        self.dispatch(ReaderCommand::HardwareStateChanged(state)).await
    }

    pub async fn raw_tag_available(&self, tag: RawTag) -> Result<()> {
        self.dispatch(ReaderCommand::RawTagAvailable(tag)).await
    }

    pub async fn enable_session(&self) -> Result<()> {
        self.dispatch(ReaderCommand::EnableSession).await
    }

    pub async fn disable_session(&self) -> Result<()> {
        self.dispatch(ReaderCommand::DisableSession).await
    }

    /// Current reader state as last published by the controller.
    pub fn state(&self) -> ReaderState {
        self.snapshot.borrow().state
    }

    /// Whether the scan session is enabled, as last published.
    pub fn is_session_enabled(&self) -> bool {
        self.snapshot.borrow().session_enabled
    }

    /// Returns `true` once the controller task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Stop the controller and wait for its task to finish.
    ///
    /// Commands queued before the shutdown are still processed.
    pub async fn shutdown(&self) {
        if self.commands.send(ReaderCommand::Shutdown).await.is_ok() {
            self.commands.closed().await;
        }
    }
}

/// Owner of the reader session.
pub struct ReaderSessionController {
    session: ReaderSession,
    decoder: CardDecoder,
    commands: mpsc::Receiver<ReaderCommand>,
    notifications: mpsc::Sender<ReaderNotification>,
    snapshot: watch::Sender<ReaderSnapshot>,
}

impl ReaderSessionController {
    /// Start a controller task.
    ///
    /// Returns the handle for feeding it and the receiver for its
    /// notifications. The task stops on [`ReaderHandle::shutdown`] or when
    /// every handle has been dropped.
    pub fn spawn(config: ReaderConfig) -> (ReaderHandle, mpsc::Receiver<ReaderNotification>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (notification_tx, notification_rx) = mpsc::channel(NOTIFICATION_BUFFER);

        let session = ReaderSession::new(config.resume_when_available);
        let (snapshot_tx, snapshot_rx) = watch::channel(ReaderSnapshot {
            state: session.state(),
            session_enabled: session.is_enabled(),
        });

        let controller = Self {
            session,
            decoder: CardDecoder::new(config.felica_mode),
            commands: command_rx,
            notifications: notification_tx,
            snapshot: snapshot_tx,
        };
        tokio::spawn(controller.run());

        let handle = ReaderHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        };
        (handle, notification_rx)
    }

    async fn run(mut self) {
        info!(felica_mode = ?self.decoder.felica_mode(), "Reader session controller started");

        while let Some(command) = self.commands.recv().await {
            match command {
                ReaderCommand::HardwareStateChanged(state) => {
                    if let Some(transition) = self.session.apply_hardware_state(state) {
                        info!(from = %transition.from, to = %transition.to, "Reader state changed");
                        self.publish();
                        self.notify(ReaderNotification::ReaderStateChanged(transition.to))
                            .await;
                    }
                }
                ReaderCommand::RawTagAvailable(tag) => self.process_tag(tag).await,
                ReaderCommand::EnableSession => {
                    if self.session.enable() {
                        info!("Scan session enabled");
                    }
                    self.publish();
                }
                ReaderCommand::DisableSession => {
                    if self.session.disable() {
                        info!("Scan session disabled");
                    }
                    self.publish();
                }
                ReaderCommand::Shutdown => break,
            }
        }

        info!("Reader session controller stopped");
    }

    async fn process_tag(&mut self, tag: RawTag) {
        if !self.session.is_enabled() {
            debug!(id = %tag.id_hex(), "Tag ignored, scan session disabled");
            return;
        }

        let decoder = self.decoder;
        match tokio::task::spawn_blocking(move || decoder.decode(&tag)).await {
            Ok(Ok(record)) => {
                info!(
                    card_type = %record.card_type(),
                    card_number = %record.card_number(),
                    "Card discovered"
                );
                self.notify(ReaderNotification::CardDiscovered {
                    record,
                    discovered_at: Utc::now(),
                })
                .await;
            }
            Ok(Err(error)) => warn!(%error, "Tag dropped"),
            Err(error) => error!(%error, "Decode task failed"),
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(ReaderSnapshot {
            state: self.session.state(),
            session_enabled: self.session.is_enabled(),
        });
    }

    async fn notify(&self, notification: ReaderNotification) {
        if self.notifications.send(notification).await.is_err() {
            debug!("Notification receiver dropped");
        }
    }
}
