//! Conversion of raw tags into card records.
//!
//! Decoding picks the first supported technology in priority order:
//!
//! | Priority | Technology      | Card number                                   |
//! |----------|-----------------|-----------------------------------------------|
//! | 1        | `FeliCa`        | IDm, as 20-digit decimal or 16 hex digits     |
//! | 2        | `MifareClassic` | last 20 hex digits of sector 0, block 2       |
//! | 3        | `TypeA`         | UID as uppercase hex                          |
//!
//! MIFARE Classic cards also answer as `TypeA`, so the order matters. Tags
//! that expose none of these fail with [`DecodeError::UnsupportedTechnology`].
//!
//! The decoder holds no state beyond its mode and performs no writes, so the
//! same tag always decodes to the same record.

use serde::{Deserialize, Serialize};
use tagrelay_core::{CardNumber, CardRecord, constants::ACCESS_CODE_LENGTH};
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::tag::{KeyKind, MifareKey, RawTag, TagMemory, Technology, to_hex};

/// Sector holding the access code on MIFARE Classic cards.
const ACCESS_CODE_SECTOR: u8 = 0;

/// Block offset of the access code inside its sector.
const ACCESS_CODE_BLOCK_OFFSET: u8 = 2;

/// Length of a FeliCa IDm in bytes.
const FELICA_IDM_LENGTH: usize = 8;

/// Well-known sector keys tried in order, each as key A then key B.
pub const WELL_KNOWN_KEYS: [MifareKey; 33] = [
    MifareKey([0x60, 0x90, 0xD0, 0x06, 0x32, 0xF5]),
    MifareKey([0x01, 0x97, 0x61, 0xAA, 0x80, 0x82]),
    MifareKey([0x57, 0x43, 0x43, 0x46, 0x76, 0x32]),
    MifareKey([0xA9, 0x91, 0x64, 0x40, 0x07, 0x48]),
    MifareKey([0x62, 0x74, 0x28, 0x19, 0xAD, 0x7C]),
    MifareKey([0xCC, 0x50, 0x75, 0xE4, 0x2B, 0xA1]),
    MifareKey([0xB9, 0xDF, 0x35, 0xA0, 0x81, 0x4C]),
    MifareKey([0x8A, 0xF9, 0xC7, 0x18, 0xF2, 0x3D]),
    MifareKey([0x58, 0xCD, 0x5C, 0x36, 0x73, 0xCB]),
    MifareKey([0xFC, 0x80, 0xE8, 0x8E, 0xB8, 0x8C]),
    MifareKey([0x7A, 0x3C, 0xDA, 0xD7, 0xC0, 0x23]),
    MifareKey([0x30, 0x42, 0x4C, 0x02, 0x90, 0x01]),
    MifareKey([0x02, 0x4E, 0x4E, 0x44, 0x00, 0x1F]),
    MifareKey([0xEC, 0xBB, 0xFA, 0x57, 0xC6, 0xAD]),
    MifareKey([0x47, 0x57, 0x69, 0x81, 0x43, 0xBD]),
    MifareKey([0x1D, 0x30, 0x97, 0x2E, 0x64, 0x85]),
    MifareKey([0xF8, 0x52, 0x6D, 0x1A, 0x8D, 0x6D]),
    MifareKey([0x13, 0x00, 0xEC, 0x8C, 0x7E, 0x80]),
    MifareKey([0xF8, 0x0A, 0x65, 0xA8, 0x7F, 0xFA]),
    MifareKey([0xDE, 0xB0, 0x6E, 0xD4, 0xAF, 0x8E]),
    MifareKey([0x4A, 0xD9, 0x6B, 0xF2, 0x81, 0x90]),
    MifareKey([0x00, 0x03, 0x90, 0x01, 0x4D, 0x41]),
    MifareKey([0x08, 0x00, 0xF9, 0x91, 0x7C, 0xB0]),
    MifareKey([0x73, 0x00, 0x50, 0x55, 0x52, 0x53]),
    MifareKey([0x41, 0x46, 0xD4, 0xA9, 0x56, 0xC4]),
    MifareKey([0x13, 0x11, 0x57, 0xFB, 0xB1, 0x26]),
    MifareKey([0xE6, 0x9D, 0xD9, 0x01, 0x5A, 0x43]),
    MifareKey([0x33, 0x72, 0x37, 0xF2, 0x54, 0xD5]),
    MifareKey([0x9A, 0x83, 0x89, 0xF3, 0x2F, 0xBF]),
    MifareKey([0x7B, 0x8F, 0xB4, 0xA7, 0x10, 0x0B]),
    MifareKey([0xC8, 0x38, 0x2A, 0x23, 0x39, 0x93]),
    MifareKey([0x7B, 0x30, 0x4F, 0x2A, 0x12, 0xA6]),
    MifareKey([0xFC, 0x94, 0x18, 0xBF, 0x78, 0x8B]),
];

/// How FeliCa identifiers are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FelicaMode {
    /// IDm as a big-endian unsigned integer, zero-padded to 20 decimal digits.
    #[default]
    Compatibility,
    /// IDm as 16 uppercase hex digits.
    Idm,
}

/// Stateless tag decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardDecoder {
    felica_mode: FelicaMode,
}

impl CardDecoder {
    pub fn new(felica_mode: FelicaMode) -> Self {
        Self { felica_mode }
    }

    pub fn felica_mode(&self) -> FelicaMode {
        self.felica_mode
    }

    /// Decode a raw tag into a card record.
    ///
    /// May block on tag memory I/O for MIFARE Classic cards.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::UnsupportedTechnology`] when no decodable technology is present
    /// - [`DecodeError::Unreadable`] when the serial or memory cannot be read
    /// - [`DecodeError::NoValidKey`] when no well-known key opens sector 0
    /// - [`DecodeError::InvalidCardNumber`] when the result is not a valid card number
    ///
    /// # Examples
    ///
    /// ```
    /// use tagrelay_reader::{CardDecoder, RawTag, Technology};
    ///
    /// let tag = RawTag::new(vec![0x04, 0xAB, 0xCD, 0xEF], vec![Technology::TypeA]);
    /// let record = CardDecoder::default().decode(&tag).unwrap();
    ///
    /// assert_eq!(record.card_type(), "TypeA");
    /// assert_eq!(record.card_number().as_str(), "04ABCDEF");
    /// ```
    pub fn decode(&self, tag: &RawTag) -> Result<CardRecord, DecodeError> {
        let (technology, number) = if tag.supports(Technology::FeliCa) {
            (Technology::FeliCa, self.felica_number(tag.id())?)
        } else if tag.supports(Technology::MifareClassic) {
            let memory = tag
                .memory()
                .ok_or_else(|| DecodeError::unreadable("tag memory is not accessible"))?;
            (Technology::MifareClassic, read_access_code(memory)?)
        } else if tag.supports(Technology::TypeA) {
            (Technology::TypeA, serial_number(tag.id())?)
        } else {
            return Err(DecodeError::UnsupportedTechnology {
                technologies: tag
                    .technologies()
                    .iter()
                    .map(|technology| technology.label())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        };

        let card_number = CardNumber::new(&number)?;
        Ok(CardRecord::new(technology.label(), card_number))
    }

    fn felica_number(&self, idm: &[u8]) -> Result<String, DecodeError> {
        let idm: [u8; FELICA_IDM_LENGTH] = idm.try_into().map_err(|_| {
            DecodeError::unreadable(format!(
                "FeliCa IDm must be {FELICA_IDM_LENGTH} bytes, got {}",
                idm.len()
            ))
        })?;

        Ok(match self.felica_mode {
            FelicaMode::Compatibility => format!("{:020}", u64::from_be_bytes(idm)),
            FelicaMode::Idm => to_hex(&idm),
        })
    }
}

fn serial_number(id: &[u8]) -> Result<String, DecodeError> {
    if id.is_empty() {
        return Err(DecodeError::unreadable("tag reported an empty serial"));
    }
    Ok(to_hex(id))
}

/// Authenticate the access code sector and read the code block.
fn read_access_code(memory: &dyn TagMemory) -> Result<String, DecodeError> {
    let block = memory.sector_to_block(ACCESS_CODE_SECTOR) + ACCESS_CODE_BLOCK_OFFSET;

    for key in &WELL_KNOWN_KEYS {
        for kind in [KeyKind::A, KeyKind::B] {
            match memory.authenticate(ACCESS_CODE_SECTOR, key, kind) {
                Ok(true) => {
                    debug!(sector = ACCESS_CODE_SECTOR, ?kind, "Sector authenticated");
                    let data = memory.read_block(block)?;
                    let hex = to_hex(&data);
                    let start = hex.len().saturating_sub(ACCESS_CODE_LENGTH);
                    return Ok(hex[start..].to_string());
                }
                Ok(false) => {}
                // A failed exchange counts as a rejected key.
                Err(error) => {
                    warn!(sector = ACCESS_CODE_SECTOR, ?kind, %error, "Authentication exchange failed");
                }
            }
        }
    }

    Err(DecodeError::NoValidKey {
        sector: ACCESS_CODE_SECTOR,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTagMemory;
    use rstest::rstest;
    use std::sync::Arc;

    const ACCESS_BLOCK: [u8; 16] = [
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45, 0x67,
        0x89,
    ];

    fn classic_tag(memory: MockTagMemory) -> RawTag {
        RawTag::new(
            vec![0x11, 0x22, 0x33, 0x44],
            vec![Technology::TypeA, Technology::MifareClassic],
        )
        .with_memory(Arc::new(memory))
    }

    #[rstest]
    #[case(vec![0x04, 0xAB, 0xCD, 0xEF], "04ABCDEF")]
    #[case(vec![0x04, 0x5A, 0x01, 0x02, 0x03, 0x04, 0x80], "045A0102030480")]
    fn test_type_a_uses_uid_hex(#[case] uid: Vec<u8>, #[case] expected: &str) {
        let tag = RawTag::new(uid, vec![Technology::TypeA]);
        let record = CardDecoder::default().decode(&tag).unwrap();
        assert_eq!(record.card_type(), "TypeA");
        assert_eq!(record.card_number().as_str(), expected);
    }

    #[test]
    fn test_felica_compatibility_mode() {
        let tag = RawTag::new(
            vec![0x01, 0x2E, 0x4C, 0xD8, 0xA3, 0x0B, 0x9F, 0x11],
            vec![Technology::FeliCa],
        );
        let record = CardDecoder::new(FelicaMode::Compatibility)
            .decode(&tag)
            .unwrap();
        assert_eq!(record.card_type(), "FeliCa");
        assert_eq!(
            record.card_number().as_str(),
            format!("{:020}", 0x012E_4CD8_A30B_9F11_u64)
        );
        assert_eq!(record.card_number().as_str().len(), 20);
    }

    #[test]
    fn test_felica_high_bit_idm_stays_positive() {
        let tag = RawTag::new(vec![0xFF; 8], vec![Technology::FeliCa]);
        let record = CardDecoder::default().decode(&tag).unwrap();
        assert_eq!(record.card_number().as_str(), "18446744073709551615");
    }

    #[test]
    fn test_felica_idm_mode() {
        let tag = RawTag::new(
            vec![0x01, 0x2E, 0x4C, 0xD8, 0xA3, 0x0B, 0x9F, 0x11],
            vec![Technology::FeliCa],
        );
        let record = CardDecoder::new(FelicaMode::Idm).decode(&tag).unwrap();
        assert_eq!(record.card_number().as_str(), "012E4CD8A30B9F11");
    }

    #[test]
    fn test_felica_wins_over_type_a() {
        let tag = RawTag::new(vec![0x00; 8], vec![Technology::TypeA, Technology::FeliCa]);
        let record = CardDecoder::default().decode(&tag).unwrap();
        assert_eq!(record.card_type(), "FeliCa");
    }

    #[test]
    fn test_felica_wrong_idm_length() {
        let tag = RawTag::new(vec![0x01, 0x02, 0x03, 0x04], vec![Technology::FeliCa]);
        assert!(matches!(
            CardDecoder::default().decode(&tag),
            Err(DecodeError::Unreadable { .. })
        ));
    }

    #[rstest]
    #[case(KeyKind::A)]
    #[case(KeyKind::B)]
    fn test_classic_reads_access_code(#[case] kind: KeyKind) {
        let memory = MockTagMemory::new()
            .with_key(WELL_KNOWN_KEYS[5], kind)
            .with_block(2, ACCESS_BLOCK.to_vec());

        let record = CardDecoder::default().decode(&classic_tag(memory)).unwrap();
        assert_eq!(record.card_type(), "MifareClassic");
        assert_eq!(record.card_number().as_str(), "01234567890123456789");
    }

    #[test]
    fn test_classic_tries_key_a_before_key_b() {
        let memory = MockTagMemory::new()
            .with_key(WELL_KNOWN_KEYS[0], KeyKind::B)
            .with_block(2, ACCESS_BLOCK.to_vec());
        let memory = Arc::new(memory);
        let tag = RawTag::new(vec![0x01; 4], vec![Technology::MifareClassic])
            .with_memory(memory.clone());

        CardDecoder::default().decode(&tag).unwrap();
        assert_eq!(
            memory.attempts(),
            vec![(WELL_KNOWN_KEYS[0], KeyKind::A), (WELL_KNOWN_KEYS[0], KeyKind::B)]
        );
    }

    #[test]
    fn test_classic_without_valid_key() {
        let memory = MockTagMemory::new().with_block(2, ACCESS_BLOCK.to_vec());
        assert!(matches!(
            CardDecoder::default().decode(&classic_tag(memory)),
            Err(DecodeError::NoValidKey { sector: 0 })
        ));
    }

    #[test]
    fn test_classic_without_memory_is_unreadable() {
        let tag = RawTag::new(vec![0x01; 4], vec![Technology::MifareClassic]);
        assert!(matches!(
            CardDecoder::default().decode(&tag),
            Err(DecodeError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_classic_read_failure_is_unreadable() {
        let memory = MockTagMemory::new().with_key(WELL_KNOWN_KEYS[0], KeyKind::A);
        assert!(matches!(
            CardDecoder::default().decode(&classic_tag(memory)),
            Err(DecodeError::Unreadable { .. })
        ));
    }

    #[rstest]
    #[case(vec![Technology::TypeB])]
    #[case(vec![Technology::IsoDep, Technology::Ndef])]
    #[case(vec![])]
    fn test_unsupported_technologies(#[case] technologies: Vec<Technology>) {
        let tag = RawTag::new(vec![0x01, 0x02, 0x03, 0x04], technologies);
        assert!(matches!(
            CardDecoder::default().decode(&tag),
            Err(DecodeError::UnsupportedTechnology { .. })
        ));
    }

    #[test]
    fn test_short_uid_is_invalid_card_number() {
        let tag = RawTag::new(vec![0x01, 0x02], vec![Technology::TypeA]);
        assert!(matches!(
            CardDecoder::default().decode(&tag),
            Err(DecodeError::InvalidCardNumber(_))
        ));
    }

    #[test]
    fn test_empty_uid_is_unreadable() {
        let tag = RawTag::new(Vec::new(), vec![Technology::TypeA]);
        assert!(matches!(
            CardDecoder::default().decode(&tag),
            Err(DecodeError::Unreadable { .. })
        ));
    }
}
