//! Stream parser for STX/ETX delimited frames.
//!
//! This module provides a stateful parser capable of handling partial frames
//! from TCP streams. The parser accumulates bytes and extracts complete
//! payloads using a two-state machine that detects STX/ETX framing.
//!
//! # Framing
//!
//! ```text
//! STX  <payload>  ETX
//! 0x02 {"...":..} 0x03
//! ```
//!
//! # Usage
//!
//! ```
//! use tagrelay_protocol::StreamParser;
//!
//! let mut parser = StreamParser::new();
//!
//! parser.feed(&[0x02, b'h', b'e']);
//! parser.feed(b"llo");
//! parser.feed(&[0x03]);
//!
//! let frame = parser.next_frame().unwrap().unwrap();
//! assert_eq!(frame, b"hello");
//! ```

use std::collections::VecDeque;

use crate::{ProtocolError, Result};
use tagrelay_core::constants::{DEFAULT_MAX_FRAME_SIZE, END_BYTE, START_BYTE};

/// Initial payload capacity for frame assembly.
const INITIAL_PAYLOAD_CAPACITY: usize = 256;

/// State machine states for parsing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for STX (0x02) start byte.
    ///
    /// Any bytes before STX are considered garbage and are discarded.
    WaitingStart,

    /// Reading payload bytes until ETX (0x03) end byte.
    ReadingPayload,
}

/// Stateful stream parser for STX/ETX frames.
///
/// State transitions:
/// - WaitingStart → ReadingPayload: STX found
/// - ReadingPayload → WaitingStart: ETX found, payload queued
/// - ReadingPayload → ReadingPayload: STX found mid-frame, partial payload dropped
/// - ReadingPayload → WaitingStart: payload exceeds the size limit, overflow queued
///
/// Complete payloads and overflows share one queue in arrival order, so
/// several frames carried by one TCP read are all extracted and a frame
/// that precedes an oversized one is still delivered.
#[derive(Debug)]
pub struct StreamParser {
    state: ParserState,
    payload: Vec<u8>,
    /// `Err` holds the wire size reached by a dropped oversized frame.
    frames: VecDeque<std::result::Result<Vec<u8>, usize>>,
    max_frame_size: usize,
    max_payload_size: usize,
}

impl StreamParser {
    /// Create a parser with the default size limit (64 KB per frame).
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a parser with a custom frame size limit.
    ///
    /// The limit counts the framing bytes, matching what goes on the wire.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            state: ParserState::WaitingStart,
            payload: Vec::with_capacity(INITIAL_PAYLOAD_CAPACITY),
            frames: VecDeque::new(),
            max_frame_size,
            max_payload_size: max_frame_size.saturating_sub(2),
        }
    }

    /// Feed bytes received from the stream.
    pub fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            match self.state {
                ParserState::WaitingStart => {
                    if byte == START_BYTE {
                        self.payload.clear();
                        self.state = ParserState::ReadingPayload;
                    }
                }
                ParserState::ReadingPayload => match byte {
                    END_BYTE => {
                        let frame = std::mem::replace(
                            &mut self.payload,
                            Vec::with_capacity(INITIAL_PAYLOAD_CAPACITY),
                        );
                        self.frames.push_back(Ok(frame));
                        self.state = ParserState::WaitingStart;
                    }
                    START_BYTE => {
                        self.payload.clear();
                    }
                    _ => {
                        self.payload.push(byte);
                        if self.payload.len() > self.max_payload_size {
                            self.frames.push_back(Err(self.payload.len() + 2));
                            self.payload.clear();
                            self.state = ParserState::WaitingStart;
                        }
                    }
                },
            }
        }
    }

    /// Pop the oldest queued entry, if any.
    ///
    /// A frame dropped for exceeding the limit comes out as
    /// [`ProtocolError::FrameTooLarge`] at the position it held on the wire.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>>> {
        let entry = self.frames.pop_front()?;
        Some(entry.map_err(|size| ProtocolError::FrameTooLarge {
            size,
            max_size: self.max_frame_size,
        }))
    }

    /// Current parser state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Number of queued entries waiting to be taken.
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Discard buffered data and return to `WaitingStart`.
    pub fn reset(&mut self) {
        self.state = ParserState::WaitingStart;
        self.payload.clear();
        self.frames.clear();
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut parser = StreamParser::new();
        parser.feed(b"\x02hello\x03");
        assert_eq!(parser.next_frame().unwrap().unwrap(), b"hello");
        assert!(parser.next_frame().is_none());
        assert_eq!(parser.state(), ParserState::WaitingStart);
    }

    #[test]
    fn test_partial_frame() {
        let mut parser = StreamParser::new();
        parser.feed(b"\x02hel");
        assert!(parser.next_frame().is_none());
        assert_eq!(parser.state(), ParserState::ReadingPayload);

        parser.feed(b"lo\x03");
        assert_eq!(parser.next_frame().unwrap().unwrap(), b"hello");
    }

    #[test]
    fn test_multiple_frames_in_one_feed() {
        let mut parser = StreamParser::new();
        parser.feed(b"\x02one\x03\x02two\x03\x02thr");
        assert_eq!(parser.pending_frames(), 2);
        assert_eq!(parser.next_frame().unwrap().unwrap(), b"one");
        assert_eq!(parser.next_frame().unwrap().unwrap(), b"two");
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_garbage_before_start_is_discarded() {
        let mut parser = StreamParser::new();
        parser.feed(b"noise\x03\x02ok\x03");
        assert_eq!(parser.next_frame().unwrap().unwrap(), b"ok");
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_restart_mid_frame() {
        let mut parser = StreamParser::new();
        parser.feed(b"\x02lost\x02kept\x03");
        assert_eq!(parser.next_frame().unwrap().unwrap(), b"kept");
    }

    #[test]
    fn test_empty_frame() {
        let mut parser = StreamParser::new();
        parser.feed(b"\x02\x03");
        assert!(parser.next_frame().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_overflow_drops_frame_and_recovers() {
        let mut parser = StreamParser::with_max_frame_size(8);
        parser.feed(b"\x02abcdefgh");
        assert!(matches!(
            parser.next_frame(),
            Some(Err(ProtocolError::FrameTooLarge { size: 9, max_size: 8 }))
        ));
        assert!(parser.next_frame().is_none());

        parser.feed(b"ij\x03\x02short\x03");
        assert_eq!(parser.next_frame().unwrap().unwrap(), b"short");
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_overflow_keeps_arrival_order() {
        let mut parser = StreamParser::with_max_frame_size(8);
        parser.feed(b"\x02hi\x03\x02aaaaaaaaaaaa\x03\x02ok\x03");

        assert_eq!(parser.next_frame().unwrap().unwrap(), b"hi");
        assert!(matches!(
            parser.next_frame(),
            Some(Err(ProtocolError::FrameTooLarge { .. }))
        ));
        assert_eq!(parser.next_frame().unwrap().unwrap(), b"ok");
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_reset() {
        let mut parser = StreamParser::new();
        parser.feed(b"\x02done\x03\x02partial");
        parser.reset();
        assert_eq!(parser.pending_frames(), 0);
        assert_eq!(parser.state(), ParserState::WaitingStart);
    }
}
