//! Wire format for the tag relay transport.
//!
//! Every message travels as one UTF-8 text frame delimited by STX/ETX
//! bytes. [`FrameCodec`] plugs that framing into Tokio's `Framed` streams,
//! and [`CardPayload`] is the outbound encoding of a decoded card.

pub mod codec;
pub mod error;
pub mod payload;
pub mod stream_parser;

pub use codec::FrameCodec;
pub use error::{ProtocolError, Result};
pub use payload::CardPayload;
pub use stream_parser::{ParserState, StreamParser};
