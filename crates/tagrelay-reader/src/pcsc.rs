//! PC/SC reader backend.
//!
//! Polls a PC/SC reader from a blocking thread and feeds the controller:
//! reader presence becomes [`ReaderState`] broadcasts and each newly inserted
//! card becomes one [`RawTag`]. Cards are classified from the ATR the reader
//! builds for them: PC/SC part 3 storage card ATRs carry the radio standard
//! and card name, other contactless ATRs mean an ISO 14443-4 card. MIFARE
//! Classic memory is accessed through the reader's pseudo-APDUs.
//!
//! A card that cannot be read is logged once and ignored until it leaves
//! the field; the reader itself stays `Available`.

use std::ffi::CString;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pcsc::{Attribute, Card, Context, Protocols, Scope, ShareMode};
use tagrelay_core::ReaderState;
use tracing::{debug, info, warn};

use crate::controller::{ReaderCommand, ReaderHandle};
use crate::tag::{KeyKind, MifareKey, RawTag, TagMemory, Technology, to_hex};
use crate::{HardwareError, Result};

/// Default delay between two polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Get data: card serial number.
const APDU_GET_UID: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

/// Historical bytes that open a PC/SC part 3 storage card ATR: category,
/// application identifier tag and length, and the PC/SC RID.
const ATR_STORAGE_CARD_RID: [u8; 8] = [0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06];

/// Offset of the storage card RID in the ATR.
const ATR_RID_OFFSET: usize = 4;

/// Offset of the radio standard byte in a PC/SC part 3 ATR.
const ATR_STANDARD_OFFSET: usize = 12;

/// Offset of the card name in a PC/SC part 3 ATR.
const ATR_CARD_NAME_OFFSET: usize = 13;

/// Reader key slot used for authentication.
const KEY_SLOT: u8 = 0x00;

/// Settings for the PC/SC backend.
#[derive(Debug, Clone)]
pub struct PcscConfig {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Use the first reader whose name contains this text; any reader if unset.
    pub reader_name: Option<String>,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            reader_name: None,
        }
    }
}

/// Card seen in the field by the previous poll.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Presence {
    Empty,
    Read(Vec<u8>),
    /// The card could not be read; skipped until it is removed.
    Unreadable,
}

/// Polling PC/SC hardware source.
#[derive(Debug)]
pub struct PcscReader {
    reader: ReaderHandle,
    config: PcscConfig,
}

impl PcscReader {
    pub fn new(reader: ReaderHandle, config: PcscConfig) -> Self {
        Self { reader, config }
    }

    /// Run the poller on the blocking pool until the controller stops.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::task::spawn_blocking(move || self.run())
    }

    fn run(self) {
        let mut context: Option<Context> = None;
        let mut state = ReaderState::Unavailable;
        let mut present = Presence::Empty;

        info!(interval_ms = self.config.poll_interval.as_millis() as u64, "PC/SC poller started");

        while !self.reader.is_closed() {
            let (next, tag) = match self.poll(&mut context, &mut present) {
                Ok(result) => result,
                Err(error) => {
                    warn!(%error, "PC/SC poll failed");
                    context = None;
                    present = Presence::Empty;
                    (ReaderState::Unavailable, None)
                }
            };

            if next != state {
                if self.broadcast(state, next).is_err() {
                    break;
                }
                state = next;
            }

            if let Some(tag) = tag
                && self
                    .reader
                    .blocking_dispatch(ReaderCommand::RawTagAvailable(tag))
                    .is_err()
            {
                break;
            }

            std::thread::sleep(self.config.poll_interval);
        }

        info!("PC/SC poller stopped");
    }

    /// Broadcast the change, passing through the transitional state.
    fn broadcast(&self, from: ReaderState, to: ReaderState) -> Result<()> {
        let via = match (from, to) {
            (ReaderState::Unavailable, ReaderState::Available) => Some(ReaderState::TurningOn),
            (ReaderState::Available, ReaderState::Unavailable) => Some(ReaderState::TurningOff),
            _ => None,
        };
        for state in via.into_iter().chain(std::iter::once(to)) {
            self.reader
                .blocking_dispatch(ReaderCommand::HardwareStateChanged(state))?;
        }
        Ok(())
    }

    fn poll(
        &self,
        context: &mut Option<Context>,
        present: &mut Presence,
    ) -> Result<(ReaderState, Option<RawTag>)> {
        if context.is_none() {
            *context = Some(Context::establish(Scope::User).map_err(pcsc_error)?);
        }
        let Some(context) = context.as_ref() else {
            return Ok((ReaderState::Unavailable, None));
        };

        let readers = match context.list_readers_owned() {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => return Ok((ReaderState::Unavailable, None)),
            Err(error) => return Err(pcsc_error(error)),
        };

        let Some(name) = self.select_reader(readers) else {
            return Ok((ReaderState::Unavailable, None));
        };

        match context.connect(&name, ShareMode::Shared, Protocols::ANY) {
            Ok(_) if *present == Presence::Unreadable => Ok((ReaderState::Available, None)),
            Ok(card) => Ok((ReaderState::Available, card_read(present, read_tag(card)))),
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                *present = Presence::Empty;
                Ok((ReaderState::Available, None))
            }
            Err(error) => {
                warn!(%error, "Card connection failed");
                Ok((ReaderState::Available, None))
            }
        }
    }

    fn select_reader(&self, readers: Vec<CString>) -> Option<CString> {
        readers.into_iter().find(|name| match &self.config.reader_name {
            Some(filter) => name.to_string_lossy().contains(filter.as_str()),
            None => true,
        })
    }
}

/// Update the presence record with one card read.
///
/// Returns the tag only when it is new to the field. A read failure never
/// escapes: the card is marked unreadable and left alone until removed.
fn card_read(present: &mut Presence, read: Result<RawTag>) -> Option<RawTag> {
    match read {
        Ok(tag) => {
            if matches!(present, Presence::Read(id) if id.as_slice() == tag.id()) {
                return None;
            }
            debug!(id = %tag.id_hex(), "Card inserted");
            *present = Presence::Read(tag.id().to_vec());
            Some(tag)
        }
        Err(error) => {
            warn!(%error, "Failed to read card, ignoring it until removed");
            *present = Presence::Unreadable;
            None
        }
    }
}

/// Technologies of a card from the ATR the reader reports for it.
///
/// Unknown ATRs yield no technology, so the decoder rejects the tag.
fn classify(atr: &[u8]) -> Vec<Technology> {
    let rid = atr.get(ATR_RID_OFFSET..ATR_STANDARD_OFFSET);
    if rid != Some(&ATR_STORAGE_CARD_RID[..]) {
        // 3B 8n 80 01: a contactless card speaking ISO 14443-4.
        return match atr {
            [0x3B, t0, 0x80, 0x01, ..] if t0 & 0xF0 == 0x80 => vec![Technology::IsoDep],
            _ => Vec::new(),
        };
    }

    let standard = atr.get(ATR_STANDARD_OFFSET).copied();
    let name = atr.get(ATR_CARD_NAME_OFFSET..ATR_CARD_NAME_OFFSET + 2);
    match (standard, name) {
        (_, Some([0xF0, 0x11] | [0xF0, 0x12])) => vec![Technology::FeliCa],
        (Some(0x01..=0x03), Some([0x00, 0x01] | [0x00, 0x02] | [0x00, 0x26])) => {
            vec![Technology::TypeA, Technology::MifareClassic]
        }
        (Some(0x01..=0x03), _) => vec![Technology::TypeA],
        (Some(0x05..=0x07), _) => vec![Technology::TypeB],
        (Some(0x09..=0x0C), _) => vec![Technology::TypeV],
        (Some(0x11), _) => vec![Technology::FeliCa],
        _ => Vec::new(),
    }
}

fn read_tag(card: Card) -> Result<RawTag> {
    let uid = transmit(&card, &APDU_GET_UID)?;
    let atr = card
        .get_attribute_owned(Attribute::AtrString)
        .map_err(pcsc_error)?;
    let technologies = classify(&atr);

    let tag = RawTag::new(uid, technologies);
    if tag.supports(Technology::MifareClassic) {
        Ok(tag.with_memory(Arc::new(PcscTagMemory {
            card: Mutex::new(card),
        })))
    } else {
        Ok(tag)
    }
}

/// Send an APDU and return the response data on `90 00`.
fn transmit(card: &Card, apdu: &[u8]) -> Result<Vec<u8>> {
    let (data, status) = exchange(card, apdu)?;
    if status != [0x90, 0x00] {
        return Err(HardwareError::invalid_data(format!(
            "APDU {} failed with status {}",
            to_hex(apdu),
            to_hex(&status)
        )));
    }
    Ok(data)
}

fn exchange(card: &Card, apdu: &[u8]) -> Result<(Vec<u8>, [u8; 2])> {
    let mut buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
    let response = card.transmit(apdu, &mut buffer).map_err(pcsc_error)?;
    match response {
        [data @ .., sw1, sw2] => Ok((data.to_vec(), [*sw1, *sw2])),
        _ => Err(HardwareError::invalid_data("APDU response without status word")),
    }
}

fn pcsc_error(error: pcsc::Error) -> HardwareError {
    match error {
        pcsc::Error::NoService | pcsc::Error::ServiceStopped => {
            HardwareError::initialization_failed(error.to_string())
        }
        pcsc::Error::ReaderUnavailable | pcsc::Error::UnknownReader => {
            HardwareError::disconnected(error.to_string())
        }
        pcsc::Error::UnsupportedCard | pcsc::Error::UnsupportedFeature => {
            HardwareError::unsupported(error.to_string())
        }
        _ => HardwareError::communication(error.to_string()),
    }
}

/// MIFARE Classic memory behind a PC/SC reader.
struct PcscTagMemory {
    card: Mutex<Card>,
}

impl std::fmt::Debug for PcscTagMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscTagMemory").finish_non_exhaustive()
    }
}

impl PcscTagMemory {
    fn with_card<T>(&self, f: impl FnOnce(&Card) -> Result<T>) -> Result<T> {
        let card = self
            .card
            .lock()
            .map_err(|_| HardwareError::communication("card handle poisoned"))?;
        f(&card)
    }
}

impl TagMemory for PcscTagMemory {
    fn authenticate(&self, sector: u8, key: &MifareKey, kind: KeyKind) -> Result<bool> {
        let block = self.sector_to_block(sector);
        let key_type = match kind {
            KeyKind::A => 0x60,
            KeyKind::B => 0x61,
        };

        self.with_card(|card| {
            let mut load_key = vec![0xFF, 0x82, 0x00, KEY_SLOT, 0x06];
            load_key.extend_from_slice(key.as_bytes());
            transmit(card, &load_key)?;

            let authenticate = [
                0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, key_type, KEY_SLOT,
            ];
            let (_, status) = exchange(card, &authenticate)?;
            Ok(status == [0x90, 0x00])
        })
    }

    fn read_block(&self, block: u8) -> Result<Vec<u8>> {
        self.with_card(|card| transmit(card, &[0xFF, 0xB0, 0x00, block, 0x10]))
    }
}
