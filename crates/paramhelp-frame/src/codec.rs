use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Header layout: magic (2) + length (4) + channel (2).
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "PH" (0x50 0x48).
pub const MAGIC: [u8; 2] = [0x50, 0x48];

/// Default payload ceiling: 1 MiB. Parameter messages are short text.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// One message on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(channel: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// Payload as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Bytes this frame occupies on the wire.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Append one encoded frame to `dst`.
///
/// ```text
/// +-----------+-------------+------------+-------------------+
/// | "PH" (2B) | length (4B) | chan (2B)  | payload (length)  |
/// |           | LE          | LE         |                   |
/// +-----------+-------------+------------+-------------------+
/// ```
pub fn encode_frame(channel: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u16_le(channel);
    dst.put_slice(payload);
    Ok(())
}

/// Take one frame off the front of `src`.
///
/// `Ok(None)` means more bytes are needed; nothing is consumed in that case.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    if src[..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    let channel = u16::from_le_bytes([src[6], src[7]]);

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    Ok(Some(Frame { channel, payload }))
}

/// Limits and timeouts applied by readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload accepted or sent. Default: 1 MiB.
    pub max_payload_size: usize,
    /// Socket read timeout; `None` blocks forever.
    pub read_timeout: Option<Duration>,
    /// Socket write timeout; `None` blocks forever.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{INFO, RPC, STREAM_OUT};

    #[test]
    fn encode_then_decode() {
        let mut buf = BytesMut::new();
        encode_frame(RPC, b"get param_double", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 16);
        assert_eq!(&buf[..2], b"PH");

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .expect("complete frame should decode");
        assert_eq!(frame.channel, RPC);
        assert_eq!(frame.text(), "get param_double");
        assert!(buf.is_empty());
    }

    #[test]
    fn short_header_needs_more() {
        let mut buf = BytesMut::from(&b"PH\x01"[..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn short_payload_needs_more() {
        let mut buf = BytesMut::new();
        encode_frame(STREAM_OUT, b"5.0\n3", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn wrong_magic_rejected() {
        let mut buf = BytesMut::from(&[0x49, 0x50, 0, 0, 0, 0, 1, 0][..]);
        let err = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic));
    }

    #[test]
    fn oversized_length_rejected_before_payload_arrives() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(4096);
        buf.put_u16_le(INFO);
        let err = decode_frame(&mut buf, 1024).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 4096, max: 1024 }));
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = BytesMut::new();
        encode_frame(RPC, b"help", &mut buf).unwrap();
        encode_frame(INFO, b"", &mut buf).unwrap();

        let first = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let second = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(first, Frame::new(RPC, &b"help"[..]));
        assert_eq!(second.channel, INFO);
        assert!(second.payload.is_empty());
        assert_eq!(second.wire_size(), HEADER_SIZE);
    }
}
