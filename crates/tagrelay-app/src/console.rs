//! Operator console commands.
//!
//! The binary reads one command per line from stdin. Parsing lives here so
//! it can be tested without a terminal.
//!
//! | Command                  | Effect                                   |
//! |--------------------------|------------------------------------------|
//! | `connect [host:port]`    | connect, optionally to a new endpoint    |
//! | `disconnect`             | close the connection                     |
//! | `on` / `off`             | power the mock reader on or off          |
//! | `enable` / `disable`     | start or stop the scan session           |
//! | `tag <tech> <hex>`       | present a tag to the mock reader         |
//! | `status`                 | print reader and connection state        |
//! | `help`                   | list commands                            |
//! | `quit`                   | shut down                                |

use std::sync::Arc;

use tagrelay_core::Endpoint;
use tagrelay_reader::mock::MockTagMemory;
use tagrelay_reader::{KeyKind, MifareKey, RawTag, Technology, WELL_KNOWN_KEYS};
use thiserror::Error;

/// Help text printed by `help`.
pub const HELP: &str = "\
commands:
  connect [host:port]   connect to the server
  disconnect            close the connection
  on | off              power the reader on or off
  enable | disable      start or stop the scan session
  tag <tech> <hex>      present a tag (typea, felica, classic, ...)
  status                show reader and connection state
  quit                  exit";

/// Key the simulated MIFARE Classic cards accept.
const SIMULATED_KEY: MifareKey = WELL_KNOWN_KEYS[0];

/// Block holding the access code on MIFARE Classic cards.
const ACCESS_CODE_BLOCK: u8 = 2;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("{0}")]
    InvalidTechnology(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error(transparent)]
    InvalidEndpoint(#[from] tagrelay_core::Error),
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect(Option<Endpoint>),
    Disconnect,
    PowerOn,
    PowerOff,
    Enable,
    Disable,
    Tag {
        technology: Technology,
        data: Vec<u8>,
    },
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse a line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, ConsoleError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "connect" => Self::Connect(words.next().map(str::parse).transpose()?),
            "disconnect" => Self::Disconnect,
            "on" => Self::PowerOn,
            "off" => Self::PowerOff,
            "enable" => Self::Enable,
            "disable" => Self::Disable,
            "tag" => {
                let technology = words
                    .next()
                    .ok_or(ConsoleError::MissingArgument("technology"))?
                    .parse()
                    .map_err(ConsoleError::InvalidTechnology)?;
                let data = parse_hex(words.next().ok_or(ConsoleError::MissingArgument("hex"))?)?;
                Self::Tag { technology, data }
            }
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };

        if let Some(extra) = words.next() {
            return Err(ConsoleError::UnexpectedArgument(extra.to_string()));
        }
        Ok(Some(command))
    }
}

/// Build the tag presented by `tag <tech> <hex>`.
///
/// For MIFARE Classic the bytes are the content of the access code block;
/// the card accepts the first well-known key as key A and uses the first
/// four bytes as UID.
/// For every other technology the bytes are the tag serial.
pub fn simulated_tag(technology: Technology, data: Vec<u8>) -> RawTag {
    match technology {
        Technology::MifareClassic => {
            let uid: Vec<u8> = data.iter().copied().take(4).collect();
            let memory = MockTagMemory::new()
                .with_key(SIMULATED_KEY, KeyKind::A)
                .with_block(ACCESS_CODE_BLOCK, data);
            RawTag::new(uid, vec![Technology::TypeA, Technology::MifareClassic])
                .with_memory(Arc::new(memory))
        }
        technology => RawTag::new(data, vec![technology]),
    }
}

fn parse_hex(text: &str) -> Result<Vec<u8>, ConsoleError> {
    let digits: String = text.chars().filter(|c| *c != ':' && *c != '-').collect();
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(ConsoleError::InvalidHex(text.to_string()));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ConsoleError::InvalidHex(text.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tagrelay_reader::CardDecoder;

    #[rstest]
    #[case("disconnect", ConsoleCommand::Disconnect)]
    #[case("ON", ConsoleCommand::PowerOn)]
    #[case("off", ConsoleCommand::PowerOff)]
    #[case("  enable  ", ConsoleCommand::Enable)]
    #[case("disable", ConsoleCommand::Disable)]
    #[case("status", ConsoleCommand::Status)]
    #[case("?", ConsoleCommand::Help)]
    #[case("exit", ConsoleCommand::Quit)]
    #[case("connect", ConsoleCommand::Connect(None))]
    fn test_parse_simple(#[case] line: &str, #[case] expected: ConsoleCommand) {
        assert_eq!(ConsoleCommand::parse(line).unwrap(), Some(expected));
    }

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(ConsoleCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_connect_with_endpoint() {
        let command = ConsoleCommand::parse("connect relay.local:4000").unwrap();
        assert_eq!(
            command,
            Some(ConsoleCommand::Connect(Some(
                Endpoint::new("relay.local", 4000).unwrap()
            )))
        );
    }

    #[test]
    fn test_parse_connect_invalid_endpoint() {
        assert!(matches!(
            ConsoleCommand::parse("connect :4000"),
            Err(ConsoleError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_parse_tag() {
        let command = ConsoleCommand::parse("tag typea 04:ab:cd:ef").unwrap();
        assert_eq!(
            command,
            Some(ConsoleCommand::Tag {
                technology: Technology::TypeA,
                data: vec![0x04, 0xAB, 0xCD, 0xEF],
            })
        );
    }

    #[rstest]
    #[case("tag", "missing argument")]
    #[case("tag typea", "missing argument")]
    #[case("tag warp 0102", "unknown technology")]
    #[case("tag typea 0x1", "invalid hex")]
    #[case("tag typea zz", "invalid hex")]
    #[case("status now", "unexpected argument")]
    #[case("launch", "unknown command")]
    fn test_parse_errors(#[case] line: &str, #[case] message: &str) {
        let error = ConsoleCommand::parse(line).unwrap_err();
        assert!(
            error.to_string().contains(message),
            "{line:?} gave {error}"
        );
    }

    #[test]
    fn test_simulated_classic_tag_decodes() {
        let block: Vec<u8> = (0x10..0x20).collect();
        let tag = simulated_tag(Technology::MifareClassic, block);
        assert_eq!(tag.id(), &[0x10, 0x11, 0x12, 0x13]);

        let record = CardDecoder::default().decode(&tag).unwrap();
        assert_eq!(record.card_type(), "MifareClassic");
        assert_eq!(record.card_number().as_str(), "161718191A1B1C1D1E1F");
    }

    #[test]
    fn test_simulated_type_a_tag() {
        let tag = simulated_tag(Technology::TypeA, vec![0x04, 0xAB, 0xCD, 0xEF]);
        let record = CardDecoder::default().decode(&tag).unwrap();
        assert_eq!(record.card_number().as_str(), "04ABCDEF");
    }
}
