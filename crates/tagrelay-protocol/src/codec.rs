//! Tokio codec for STX/ETX text frames.
//!
//! `FrameCodec` wraps the [`StreamParser`] to provide a thin integration
//! layer with Tokio's codec traits:
//! - [`Decoder`]: extracts complete UTF-8 messages from the byte stream
//! - [`Encoder`]: writes any `AsRef<str>` message with STX/ETX framing
//!
//! ```text
//! TCP Stream -> Decoder -> String (one per frame)
//! String -> Encoder -> TCP Stream (with STX/ETX framing)
//! ```
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use tagrelay_protocol::FrameCodec;
//! use futures::{SinkExt, StreamExt};
//!
//! # async fn example() -> tagrelay_protocol::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:3000").await?;
//! let mut framed = Framed::new(stream, FrameCodec::new());
//!
//! framed.send("hello".to_string()).await?;
//!
//! if let Some(Ok(reply)) = framed.next().await {
//!     println!("Received: {reply}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Decoding fails when a frame exceeds the maximum size or is not valid
//! UTF-8. Encoding fails when the payload contains a framing byte or the
//! framed output would exceed the maximum size. The codec never panics.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::{ProtocolError, Result, StreamParser};
use tagrelay_core::constants::{DEFAULT_MAX_FRAME_SIZE, END_BYTE, START_BYTE};

/// Tokio codec for relay text frames.
#[derive(Debug)]
pub struct FrameCodec {
    parser: StreamParser,
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a new codec with the default maximum frame size (64 KB).
    ///
    /// ```
    /// use tagrelay_protocol::FrameCodec;
    ///
    /// let codec = FrameCodec::new();
    /// assert_eq!(codec.max_frame_size(), 64 * 1024);
    /// ```
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new codec with custom maximum frame size.
    ///
    /// The limit includes the two framing bytes.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            parser: StreamParser::with_max_frame_size(max_frame_size),
            max_frame_size,
        }
    }

    /// Get the current maximum frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = ProtocolError;

    /// Decode one message from the byte stream.
    ///
    /// Returns `Ok(None)` while a frame is incomplete. Bytes are moved
    /// into the parser's own buffer, so `src` is always drained.
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use tokio_util::codec::Decoder;
    /// use tagrelay_protocol::FrameCodec;
    ///
    /// let mut codec = FrameCodec::new();
    /// let mut buffer = BytesMut::from(&b"\x02welcome\x03"[..]);
    ///
    /// assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("welcome"));
    /// ```
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if !src.is_empty() {
            self.parser.feed(src);
            src.clear();
        }

        match self.parser.next_frame() {
            Some(payload) => Ok(Some(String::from_utf8(payload?)?)),
            None => Ok(None),
        }
    }
}

impl<T> Encoder<T> for FrameCodec
where
    T: AsRef<str>,
{
    type Error = ProtocolError;

    /// Encode a message with STX/ETX framing.
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use tokio_util::codec::Encoder;
    /// use tagrelay_protocol::FrameCodec;
    ///
    /// let mut codec = FrameCodec::new();
    /// let mut buffer = BytesMut::new();
    /// codec.encode("ping", &mut buffer).unwrap();
    ///
    /// assert_eq!(&buffer[..], b"\x02ping\x03");
    /// ```
    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let item = item.as_ref();
        if let Some(offset) = item
            .bytes()
            .position(|b| b == START_BYTE || b == END_BYTE)
        {
            return Err(ProtocolError::ReservedByte {
                byte: item.as_bytes()[offset],
                offset,
            });
        }

        let size = item.len() + 2;
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max_size: self.max_frame_size,
            });
        }

        dst.reserve(size);
        dst.extend_from_slice(&[START_BYTE]);
        dst.extend_from_slice(item.as_bytes());
        dst.extend_from_slice(&[END_BYTE]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_incomplete_returns_none() {
        let mut codec = FrameCodec::new();
        let mut buffer = BytesMut::from(&b"\x02part"[..]);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
        assert!(buffer.is_empty());

        let mut rest = BytesMut::from(&b"ial\x03"[..]);
        assert_eq!(codec.decode(&mut rest).unwrap().as_deref(), Some("partial"));
    }

    #[test]
    fn test_decode_queued_frames_in_order() {
        let mut codec = FrameCodec::new();
        let mut buffer = BytesMut::from(&b"\x02first\x03\x02second\x03"[..]);

        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("first"));
        let mut empty = BytesMut::new();
        assert_eq!(codec.decode(&mut empty).unwrap().as_deref(), Some("second"));
        assert!(codec.decode(&mut empty).unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let mut codec = FrameCodec::new();
        let mut buffer = BytesMut::from(&b"\x02\xff\xfe\x03"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_decode_oversized_frame() {
        let mut codec = FrameCodec::with_max_frame_size(6);
        let mut buffer = BytesMut::from(&b"\x02toolong\x03"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::FrameTooLarge { max_size: 6, .. })
        ));
    }

    #[test]
    fn test_decode_frame_before_oversized_frame() {
        let mut codec = FrameCodec::with_max_frame_size(16);
        let mut wire = b"\x02hi\x03\x02".to_vec();
        wire.extend_from_slice(&[b'a'; 40]);
        wire.push(0x03);
        let mut buffer = BytesMut::from(&wire[..]);

        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("hi"));
        assert!(matches!(
            codec.decode(&mut buffer),
            Err(ProtocolError::FrameTooLarge {
                size: 17,
                max_size: 16
            })
        ));
        assert!(codec.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_decode_utf8_payload() {
        let mut codec = FrameCodec::new();
        let mut buffer = BytesMut::from("\x02已连接\x03".as_bytes());
        assert_eq!(codec.decode(&mut buffer).unwrap().as_deref(), Some("已连接"));
    }

    #[test]
    fn test_encode_rejects_reserved_bytes() {
        let mut codec = FrameCodec::new();
        let mut buffer = BytesMut::new();
        let result = codec.encode("bad\u{3}payload", &mut buffer);
        assert!(matches!(
            result,
            Err(ProtocolError::ReservedByte {
                byte: 0x03,
                offset: 3
            })
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let mut codec = FrameCodec::with_max_frame_size(6);
        let mut buffer = BytesMut::new();
        assert!(codec.encode("abcd", &mut buffer).is_ok());
        assert!(matches!(
            codec.encode("abcde", &mut buffer),
            Err(ProtocolError::FrameTooLarge { size: 7, max_size: 6 })
        ));
    }

    #[test]
    fn test_encode_owned_string() {
        let mut codec = FrameCodec::new();
        let mut buffer = BytesMut::new();
        codec.encode("owned".to_string(), &mut buffer).unwrap();
        assert_eq!(&buffer[..], b"\x02owned\x03");
    }
}
