//! Native protocol framing (versions 1 to 4).
//!
//! ```text
//! v1, v2: | version | flags | stream (i8)  | opcode | length (u32) |   8 bytes
//! v3, v4: | version | flags | stream (i16) | opcode | length (u32) |   9 bytes
//! ```
//!
//! The high bit of `version` marks a response.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::WireError;

/// Oldest protocol version the gateway accepts.
pub const MIN_VERSION: u8 = 1;

/// Newest protocol version the gateway accepts.
pub const MAX_VERSION: u8 = 4;

/// Direction bit of the version byte.
pub const RESPONSE_BIT: u8 = 0x80;

/// Stream id of server-pushed events.
pub const EVENT_STREAM: i16 = -1;

/// Frame header flags.
pub mod flags {
    pub const COMPRESSION: u8 = 0x01;
    pub const TRACING: u8 = 0x02;
    pub const CUSTOM_PAYLOAD: u8 = 0x04;
    pub const WARNING: u8 = 0x08;
}

/// Message kind carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Credentials = 0x04,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
    Batch = 0x0D,
    AuthChallenge = 0x0E,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
}

impl Opcode {
    pub fn from_u8(value: u8, stream: i16) -> Result<Self, WireError> {
        Ok(match value {
            0x00 => Self::Error,
            0x01 => Self::Startup,
            0x02 => Self::Ready,
            0x03 => Self::Authenticate,
            0x04 => Self::Credentials,
            0x05 => Self::Options,
            0x06 => Self::Supported,
            0x07 => Self::Query,
            0x08 => Self::Result,
            0x09 => Self::Prepare,
            0x0A => Self::Execute,
            0x0B => Self::Register,
            0x0C => Self::Event,
            0x0D => Self::Batch,
            0x0E => Self::AuthChallenge,
            0x0F => Self::AuthResponse,
            0x10 => Self::AuthSuccess,
            opcode => return Err(WireError::UnknownOpcode { opcode, stream }),
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Header length for a protocol version.
pub fn header_len(version: u8) -> usize {
    if version >= 3 { 9 } else { 8 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw version byte including the direction bit.
    pub version: u8,
    pub flags: u8,
    pub stream: i16,
    pub opcode: Opcode,
    pub length: u32,
}

impl FrameHeader {
    pub fn protocol_version(&self) -> u8 {
        self.version & !RESPONSE_BIT
    }

    pub fn is_response(&self) -> bool {
        self.version & RESPONSE_BIT != 0
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// A complete frame with an undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

impl Frame {
    fn build(version: u8, flags: u8, stream: i16, opcode: Opcode, body: Bytes) -> Self {
        Self {
            header: FrameHeader {
                version,
                flags,
                stream,
                opcode,
                length: body.len() as u32,
            },
            body,
        }
    }

    /// A client-to-server frame.
    pub fn request(version: u8, stream: i16, opcode: Opcode, body: Bytes) -> Self {
        Self::build(version & !RESPONSE_BIT, 0, stream, opcode, body)
    }

    /// A server-to-client frame.
    pub fn response(version: u8, stream: i16, opcode: Opcode, body: Bytes) -> Self {
        Self::build(version | RESPONSE_BIT, 0, stream, opcode, body)
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.header.flags = flags;
        self
    }

    pub fn version(&self) -> u8 {
        self.header.protocol_version()
    }

    pub fn stream(&self) -> i16 {
        self.header.stream
    }

    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    pub fn encode(&self) -> Bytes {
        encode(self)
    }
}

/// Size of the first complete frame in `data`, or `None` if more bytes are needed.
///
/// Checks the version byte as soon as it arrives so an unsupported client
/// can be answered before its whole frame is read.
pub fn frame_size(data: &[u8], max_body: usize) -> Result<Option<usize>, WireError> {
    let Some(&first) = data.first() else {
        return Ok(None);
    };

    let version = first & !RESPONSE_BIT;
    if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
        return Err(WireError::UnsupportedVersion {
            version,
            stream: guess_stream(data),
        });
    }

    let header = header_len(version);
    if data.len() < header {
        return Ok(None);
    }

    let length = u32::from_be_bytes([
        data[header - 4],
        data[header - 3],
        data[header - 2],
        data[header - 1],
    ]) as usize;
    if length > max_body {
        return Err(WireError::FrameTooLarge {
            length,
            max: max_body,
        });
    }

    let total = header + length;
    Ok((data.len() >= total).then_some(total))
}

/// Stream id of a frame in an unknown version, read with the v3+ layout.
fn guess_stream(data: &[u8]) -> i16 {
    match data {
        [_, _, hi, lo, ..] => i16::from_be_bytes([*hi, *lo]),
        _ => 0,
    }
}

/// Decode one complete frame as delimited by [`frame_size`].
pub fn decode(mut data: Bytes) -> Result<Frame, WireError> {
    if data.is_empty() {
        return Err(WireError::Truncated("frame header"));
    }
    let version_byte = data.get_u8();
    let version = version_byte & !RESPONSE_BIT;
    if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
        return Err(WireError::UnsupportedVersion {
            version,
            stream: 0,
        });
    }
    if data.remaining() < header_len(version) - 1 {
        return Err(WireError::Truncated("frame header"));
    }

    let flags = data.get_u8();
    let stream = if version >= 3 {
        data.get_i16()
    } else {
        i16::from(data.get_i8())
    };
    let opcode = data.get_u8();
    let length = data.get_u32();
    if data.remaining() < length as usize {
        return Err(WireError::Truncated("frame body"));
    }
    let opcode = Opcode::from_u8(opcode, stream)?;

    Ok(Frame {
        header: FrameHeader {
            version: version_byte,
            flags,
            stream,
            opcode,
            length,
        },
        body: data.split_to(length as usize),
    })
}

pub fn encode(frame: &Frame) -> Bytes {
    let version = frame.header.protocol_version();
    let mut buf = BytesMut::with_capacity(header_len(version) + frame.body.len());
    buf.put_u8(frame.header.version);
    buf.put_u8(frame.header.flags);
    if version >= 3 {
        buf.put_i16(frame.header.stream);
    } else {
        buf.put_i8(frame.header.stream as i8);
    }
    buf.put_u8(frame.header.opcode.as_u8());
    buf.put_u32(frame.body.len() as u32);
    buf.put_slice(&frame.body);
    buf.freeze()
}

/// Reads whole frames from a byte stream.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_body: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_body: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(64 * 1024),
            max_body,
        }
    }

    /// Next frame, or `None` on a clean end of stream.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, WireError> {
        loop {
            match frame_size(&self.buf, self.max_body) {
                Ok(Some(size)) => {
                    let data = self.buf.split_to(size).freeze();
                    return decode(data).map(Some);
                }
                Ok(None) => {}
                Err(e) => {
                    // Nothing after an unreadable header can be delimited.
                    self.buf.clear();
                    return Err(e);
                }
            }

            if self.inner.read_buf(&mut self.buf).await? == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(WireError::Truncated("frame, connection closed"))
                };
            }
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_header_layout() {
        let frame = Frame::response(4, 300, Opcode::Ready, Bytes::new());
        let encoded = frame.encode();
        assert_eq!(&encoded[..], &[0x84, 0, 0x01, 0x2C, 0x02, 0, 0, 0, 0]);
        assert_eq!(decode(encoded).unwrap(), frame);
    }

    #[test]
    fn test_v2_uses_single_byte_stream() {
        let frame = Frame::request(2, -1, Opcode::Options, Bytes::new());
        let encoded = frame.encode();
        assert_eq!(encoded.len(), 8);
        let decoded = decode(encoded).unwrap();
        assert_eq!(decoded.stream(), -1);
        assert!(!decoded.header.is_response());
    }

    #[test]
    fn test_frame_size() {
        let frame = Frame::request(3, 1, Opcode::Query, Bytes::from_static(b"abcd"));
        let encoded = frame.encode();

        assert_eq!(frame_size(&encoded, 1024).unwrap(), Some(13));
        assert_eq!(frame_size(&encoded[..5], 1024).unwrap(), None);
        assert_eq!(frame_size(&encoded[..12], 1024).unwrap(), None);
        assert!(matches!(
            frame_size(&encoded, 2),
            Err(WireError::FrameTooLarge { length: 4, max: 2 })
        ));
    }

    #[test]
    fn test_unsupported_version_reports_stream() {
        let data = [0x05, 0x00, 0x00, 0x07, 0x05, 0, 0, 0, 0];
        assert!(matches!(
            frame_size(&data, 1024),
            Err(WireError::UnsupportedVersion { version: 5, stream: 7 })
        ));
    }

    #[test]
    fn test_unknown_opcode() {
        let data = Bytes::from_static(&[0x04, 0x00, 0x00, 0x02, 0x42, 0, 0, 0, 0]);
        assert!(matches!(
            decode(data),
            Err(WireError::UnknownOpcode { opcode: 0x42, stream: 2 })
        ));
    }

    #[tokio::test]
    async fn test_reader_splits_coalesced_frames() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&Frame::request(4, 1, Opcode::Options, Bytes::new()).encode());
        wire.extend_from_slice(
            &Frame::request(4, 2, Opcode::Query, Bytes::from_static(b"xyz")).encode(),
        );

        let mut reader = FrameReader::new(&wire[..], 1024);
        assert_eq!(reader.read_frame().await.unwrap().unwrap().stream(), 1);
        let second = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(second.body, Bytes::from_static(b"xyz"));
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_rejects_partial_frame_at_eof() {
        let encoded = Frame::request(4, 1, Opcode::Query, Bytes::from_static(b"xyz")).encode();
        let mut reader = FrameReader::new(&encoded[..10], 1024);
        assert!(matches!(reader.read_frame().await, Err(WireError::Truncated(_))));
    }
}
