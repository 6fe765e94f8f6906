//! In-memory MIFARE Classic card.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::tag::{KeyKind, MifareKey, TagMemory};
use crate::{HardwareError, Result};

/// Simulated tag memory with one accepted key and a set of blocks.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tagrelay_reader::mock::MockTagMemory;
/// use tagrelay_reader::{CardDecoder, KeyKind, RawTag, Technology, WELL_KNOWN_KEYS};
///
/// let memory = MockTagMemory::new()
///     .with_key(WELL_KNOWN_KEYS[0], KeyKind::A)
///     .with_block(2, vec![0x12; 16]);
/// let tag = RawTag::new(vec![0x01, 0x02, 0x03, 0x04], vec![Technology::MifareClassic])
///     .with_memory(Arc::new(memory));
///
/// let record = CardDecoder::default().decode(&tag).unwrap();
/// assert_eq!(record.card_number().as_str(), "12121212121212121212");
/// ```
#[derive(Debug, Default)]
pub struct MockTagMemory {
    accepted: Option<(MifareKey, KeyKind)>,
    blocks: HashMap<u8, Vec<u8>>,
    attempts: Mutex<Vec<(MifareKey, KeyKind)>>,
    fail_exchanges: bool,
}

impl MockTagMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `key` as the given key kind for every sector.
    pub fn with_key(mut self, key: MifareKey, kind: KeyKind) -> Self {
        self.accepted = Some((key, kind));
        self
    }

    /// Store the contents of an absolute block.
    pub fn with_block(mut self, block: u8, data: Vec<u8>) -> Self {
        self.blocks.insert(block, data);
        self
    }

    /// Make every exchange fail as if the tag left the field.
    pub fn with_failing_exchanges(mut self) -> Self {
        self.fail_exchanges = true;
        self
    }

    /// Keys tried so far, in order.
    pub fn attempts(&self) -> Vec<(MifareKey, KeyKind)> {
        self.attempts
            .lock()
            .map(|attempts| attempts.clone())
            .unwrap_or_default()
    }
}

impl TagMemory for MockTagMemory {
    fn authenticate(&self, _sector: u8, key: &MifareKey, kind: KeyKind) -> Result<bool> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push((*key, kind));
        }
        if self.fail_exchanges {
            return Err(HardwareError::communication("tag left the field"));
        }
        Ok(self.accepted == Some((*key, kind)))
    }

    fn read_block(&self, block: u8) -> Result<Vec<u8>> {
        if self.fail_exchanges {
            return Err(HardwareError::communication("tag left the field"));
        }
        self.blocks
            .get(&block)
            .cloned()
            .ok_or_else(|| HardwareError::invalid_data(format!("block {block} not readable")))
    }
}
