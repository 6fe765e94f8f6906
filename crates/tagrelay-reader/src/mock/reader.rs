//! Mock reader hardware.
//!
//! [`MockReader`] plays the part of the hardware collaborator: it broadcasts
//! power transitions and presents tags to a running controller.

use std::collections::HashMap;
use std::time::Duration;

use tagrelay_core::ReaderState;

use crate::tag::{RawTag, Technology};
use crate::{HardwareError, ReaderHandle, Result};

/// Simulated reader attached to a controller.
///
/// # Examples
///
/// ```
/// use tagrelay_core::ReaderState;
/// use tagrelay_reader::mock::MockReader;
/// use tagrelay_reader::{RawTag, ReaderConfig, ReaderSessionController, Technology};
///
/// #[tokio::main]
/// async fn main() -> tagrelay_reader::Result<()> {
///     let (reader, _notifications) = ReaderSessionController::spawn(ReaderConfig::default());
///     let mut hardware = MockReader::attach(reader.clone());
///
///     let uid = vec![0x04, 0xAB, 0xCD, 0xEF];
///     hardware.add_card(uid.clone(), RawTag::new(uid.clone(), vec![Technology::TypeA]));
///
///     hardware.power_on().await?;
///     reader.enable_session().await?;
///     hardware.present_card(&uid).await?;
///
///     reader.shutdown().await;
///     assert_eq!(reader.state(), ReaderState::Available);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockReader {
    reader: ReaderHandle,
    name: String,
    state: ReaderState,
    transition_delay: Duration,
    cards: HashMap<Vec<u8>, RawTag>,
}

impl MockReader {
    /// Attach a mock reader with the default name.
    pub fn attach(reader: ReaderHandle) -> Self {
        Self::with_name(reader, "Mock NFC Reader")
    }

    /// Attach a mock reader with a custom name.
    pub fn with_name(reader: ReaderHandle, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            state: ReaderState::Unavailable,
            transition_delay: Duration::ZERO,
            cards: HashMap::new(),
        }
    }

    /// Pause between the two broadcasts of a power transition.
    pub fn with_transition_delay(mut self, delay: Duration) -> Self {
        self.transition_delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last state broadcast by this reader.
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Broadcast a single state.
    pub async fn set_state(&mut self, state: ReaderState) -> Result<()> {
        self.reader.hardware_state_changed(state).await?;
        self.state = state;
        Ok(())
    }

    /// Broadcast `TurningOn` then `Available`.
    pub async fn power_on(&mut self) -> Result<()> {
        self.set_state(ReaderState::TurningOn).await?;
        self.pause().await;
        self.set_state(ReaderState::Available).await
    }

    /// Broadcast `TurningOff` then `Unavailable`.
    pub async fn power_off(&mut self) -> Result<()> {
        self.set_state(ReaderState::TurningOff).await?;
        self.pause().await;
        self.set_state(ReaderState::Unavailable).await
    }

    /// Register a tag that can later be presented by its serial.
    pub fn add_card(&mut self, id: Vec<u8>, tag: RawTag) {
        self.cards.insert(id, tag);
    }

    /// Present a registered tag.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InvalidData` if no tag was registered under
    /// `id`, or `HardwareError::Disconnected` if the controller stopped.
    pub async fn present_card(&self, id: &[u8]) -> Result<()> {
        let tag = self
            .cards
            .get(id)
            .cloned()
            .ok_or_else(|| HardwareError::invalid_data(format!("Card {id:02X?} not in database")))?;
        self.present_tag(tag).await
    }

    /// Present an arbitrary tag.
    pub async fn present_tag(&self, tag: RawTag) -> Result<()> {
        self.reader.raw_tag_available(tag).await
    }

    /// Present a plain NFC-A tag with the given UID.
    pub async fn present_type_a(&self, uid: impl Into<Vec<u8>>) -> Result<()> {
        self.present_tag(RawTag::new(uid, vec![Technology::TypeA]))
            .await
    }

    async fn pause(&self) {
        if !self.transition_delay.is_zero() {
            tokio::time::sleep(self.transition_delay).await;
        }
    }
}
