//! Raw tag model handed over by the hardware layer.
//!
//! A [`RawTag`] is what a reader reports when a card enters its field: the
//! serial number, the technologies the card answered to, and optionally a
//! [`TagMemory`] capability for cards whose identifier lives in a memory
//! block rather than in the serial.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Size of a MIFARE Classic sector key in bytes.
pub const MIFARE_KEY_LENGTH: usize = 6;

/// Contactless technology a tag answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Technology {
    /// NFC-F (Sony FeliCa).
    FeliCa,
    /// MIFARE Classic memory card (an NFC-A card with sector authentication).
    MifareClassic,
    /// NFC-A (ISO 14443-3A).
    TypeA,
    /// NFC-B (ISO 14443-3B).
    TypeB,
    /// NFC-V (ISO 15693).
    TypeV,
    /// ISO 14443-4 transport.
    IsoDep,
    /// NDEF formatted tag.
    Ndef,
}

impl Technology {
    /// Label used as the card type of decoded records.
    pub fn label(self) -> &'static str {
        match self {
            Self::FeliCa => "FeliCa",
            Self::MifareClassic => "MifareClassic",
            Self::TypeA => "TypeA",
            Self::TypeB => "TypeB",
            Self::TypeV => "TypeV",
            Self::IsoDep => "IsoDep",
            Self::Ndef => "Ndef",
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Technology {
    type Err = String;

    /// Parse a technology name, case-insensitively.
    ///
    /// Both the labels (`TypeA`) and the NFC Forum names (`NfcA`) are accepted.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "felica" | "nfcf" => Ok(Self::FeliCa),
            "mifareclassic" | "classic" => Ok(Self::MifareClassic),
            "typea" | "nfca" => Ok(Self::TypeA),
            "typeb" | "nfcb" => Ok(Self::TypeB),
            "typev" | "nfcv" => Ok(Self::TypeV),
            "isodep" => Ok(Self::IsoDep),
            "ndef" => Ok(Self::Ndef),
            _ => Err(format!("unknown technology: {s}")),
        }
    }
}

/// Which of the two sector keys to authenticate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    A,
    B,
}

/// Six-byte MIFARE Classic sector key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MifareKey(pub [u8; MIFARE_KEY_LENGTH]);

impl MifareKey {
    pub fn as_bytes(&self) -> &[u8; MIFARE_KEY_LENGTH] {
        &self.0
    }
}

// Keys are secrets; keep them out of logs.
impl fmt::Debug for MifareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MifareKey(..)")
    }
}

/// Access to the memory of a tag that is still in the reader's field.
///
/// Implementations block on hardware I/O, so callers must not use them from
/// an async context directly.
pub trait TagMemory: Send + Sync + fmt::Debug {
    /// Try to authenticate `sector` with `key`.
    ///
    /// Returns `Ok(false)` when the card rejects the key. `Err` means the
    /// exchange itself failed.
    fn authenticate(&self, sector: u8, key: &MifareKey, kind: KeyKind) -> Result<bool>;

    /// Read one 16-byte block by absolute block number.
    fn read_block(&self, block: u8) -> Result<Vec<u8>>;

    /// First block number of `sector`.
    fn sector_to_block(&self, sector: u8) -> u8 {
        // 1K and the lower 2K of 4K cards use four blocks per sector.
        sector.saturating_mul(4)
    }
}

/// A tag as reported by the hardware.
#[derive(Debug, Clone)]
pub struct RawTag {
    id: Vec<u8>,
    technologies: Vec<Technology>,
    memory: Option<Arc<dyn TagMemory>>,
}

impl RawTag {
    /// Create a tag with a serial and its technologies.
    ///
    /// ```
    /// use tagrelay_reader::{RawTag, Technology};
    ///
    /// let tag = RawTag::new(vec![0x04, 0xAB, 0xCD, 0xEF], vec![Technology::TypeA]);
    /// assert_eq!(tag.id_hex(), "04ABCDEF");
    /// assert!(tag.supports(Technology::TypeA));
    /// ```
    pub fn new(id: impl Into<Vec<u8>>, technologies: impl Into<Vec<Technology>>) -> Self {
        Self {
            id: id.into(),
            technologies: technologies.into(),
            memory: None,
        }
    }

    /// Attach a memory capability.
    pub fn with_memory(mut self, memory: Arc<dyn TagMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Serial number as uppercase hex.
    pub fn id_hex(&self) -> String {
        to_hex(&self.id)
    }

    pub fn technologies(&self) -> &[Technology] {
        &self.technologies
    }

    pub fn supports(&self, technology: Technology) -> bool {
        self.technologies.contains(&technology)
    }

    pub fn memory(&self) -> Option<&dyn TagMemory> {
        self.memory.as_deref()
    }
}

/// Render bytes as uppercase hex without separators.
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("TypeA", Technology::TypeA)]
    #[case("nfca", Technology::TypeA)]
    #[case("FELICA", Technology::FeliCa)]
    #[case("classic", Technology::MifareClassic)]
    #[case("IsoDep", Technology::IsoDep)]
    fn test_technology_parse(#[case] input: &str, #[case] expected: Technology) {
        assert_eq!(input.parse::<Technology>().unwrap(), expected);
    }

    #[test]
    fn test_technology_parse_unknown() {
        assert!("bluetooth".parse::<Technology>().is_err());
    }

    #[test]
    fn test_labels_round_trip_through_parse() {
        for tech in [
            Technology::FeliCa,
            Technology::MifareClassic,
            Technology::TypeA,
            Technology::TypeB,
            Technology::TypeV,
            Technology::IsoDep,
            Technology::Ndef,
        ] {
            assert_eq!(tech.label().parse::<Technology>().unwrap(), tech);
        }
    }

    #[test]
    fn test_hex_is_uppercase_and_padded() {
        assert_eq!(to_hex(&[0x00, 0x0a, 0xff]), "000AFF");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn test_key_debug_hides_bytes() {
        let key = MifareKey([0xFF; 6]);
        assert_eq!(format!("{key:?}"), "MifareKey(..)");
    }
}
