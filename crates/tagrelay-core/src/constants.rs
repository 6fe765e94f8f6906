//! Core constants shared by the relay crates.
//!
//! This module centralizes the limits and defaults used throughout the
//! tag relay: card number bounds, wire framing bytes, and transport
//! timeouts. Keeping them in one place guarantees that the decoder, the
//! codec and the transport agree on the same values.
//!
//! # Usage
//!
//! ```
//! use tagrelay_core::constants::*;
//!
//! fn is_valid_length(number: &str) -> bool {
//!     (MIN_CARD_NUMBER_LENGTH..=MAX_CARD_NUMBER_LENGTH).contains(&number.len())
//! }
//!
//! assert!(is_valid_length("04ABCDEF"));
//! assert_eq!(START_BYTE, 0x02);
//! ```

// ============================================================================
// Card Numbers
// ============================================================================

/// Minimum card number length in characters.
///
/// The shortest identifier the decoder produces is a 4-byte UID rendered
/// as 8 hex digits.
pub const MIN_CARD_NUMBER_LENGTH: usize = 8;

/// Maximum card number length in characters.
///
/// Access codes and zero-padded FeliCa identifiers are exactly 20
/// characters; a 10-byte UID is 20 hex digits as well.
pub const MAX_CARD_NUMBER_LENGTH: usize = 20;

/// Length of an access code read from card memory, in characters.
pub const ACCESS_CODE_LENGTH: usize = 20;

// ============================================================================
// Wire Framing
// ============================================================================

/// Start-of-text marker opening every frame on the wire.
pub const START_BYTE: u8 = 0x02;

/// End-of-text marker closing every frame on the wire.
pub const END_BYTE: u8 = 0x03;

/// Default maximum frame size in bytes (64 KB).
///
/// Frames larger than this are rejected by the codec.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

// ============================================================================
// Transport
// ============================================================================

/// Default connection attempt timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

/// Highest valid TCP port.
pub const MAX_PORT: u32 = 65535;

/// Default initial delay for backoff reconnection, in milliseconds.
pub const DEFAULT_RECONNECT_INITIAL_DELAY_MS: u64 = 500;

/// Default cap for backoff reconnection delay, in milliseconds.
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Default number of attempts for backoff reconnection.
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
