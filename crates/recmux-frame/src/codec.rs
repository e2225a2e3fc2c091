use bytes::BytesMut;

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Header: total length (4) + type (1) + urgent flag (1) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Width of the length prefix and of every appended numeric value.
pub const NUMERIC_WIDTH: usize = 4;

/// Default maximum total message size accepted from a peer: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Byte order of a 4-byte field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// The byte order used by both ends of every pipe.
///
/// Both processes must be built with the same value; nothing on the wire
/// identifies it.
pub const WIRE_BYTE_ORDER: ByteOrder = ByteOrder::LittleEndian;

/// Encode a 4-byte value in [`WIRE_BYTE_ORDER`].
pub fn encode_u32(value: u32) -> [u8; NUMERIC_WIDTH] {
    match WIRE_BYTE_ORDER {
        ByteOrder::LittleEndian => value.to_le_bytes(),
        ByteOrder::BigEndian => value.to_be_bytes(),
    }
}

/// Decode a 4-byte value in [`WIRE_BYTE_ORDER`].
pub fn decode_u32(bytes: [u8; NUMERIC_WIDTH]) -> u32 {
    match WIRE_BYTE_ORDER {
        ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
        ByteOrder::BigEndian => u32::from_be_bytes(bytes),
    }
}

/// Read the total-length prefix at the front of `src`, if present.
pub fn peek_length(src: &[u8]) -> Option<usize> {
    let prefix: [u8; NUMERIC_WIDTH] = src.get(..NUMERIC_WIDTH)?.try_into().ok()?;
    Some(decode_u32(prefix) as usize)
}

/// Decode one message from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete message yet.
/// On success, consumes the message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_message: usize) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let total = peek_length(src).unwrap_or_default();
    if total < HEADER_SIZE {
        return Err(FrameError::InvalidLength {
            len: total,
            min: HEADER_SIZE,
        });
    }
    if total > max_message {
        return Err(FrameError::MessageTooLarge {
            size: total,
            max: max_message,
        });
    }

    if src.len() < total {
        return Ok(None); // Need more data
    }

    Ok(Some(Message::from_wire_unchecked(src.split_to(total))))
}

/// Configuration for message framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum total message size in bytes. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;
    use crate::message::MessageType;

    #[test]
    fn test_length_prefix_is_little_endian() {
        assert_eq!(encode_u32(0x0102_0304), [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(decode_u32([0x06, 0, 0, 0]), 6);
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x06, 0x00, 0x00][..]);
        assert!(decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut msg = Message::new(MessageType::Recog, false);
        msg.append(b"hello");
        let mut buf = BytesMut::from(msg.as_bytes());
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let mut first = Message::new(MessageType::Ready, true);
        first.append(b"one");
        let mut buf = BytesMut::from(first.as_bytes());
        buf.put_slice(&[0x09, 0x00]);

        let decoded = decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, first);
        assert_eq!(buf.as_ref(), &[0x09, 0x00]);
    }

    #[test]
    fn test_decode_rejects_length_below_header() {
        let mut buf = BytesMut::new();
        buf.put_slice(&encode_u32(3));
        buf.put_u8(0);
        buf.put_u8(0);

        let err = decode_message(&mut buf, DEFAULT_MAX_MESSAGE).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { len: 3, .. }));
    }

    #[test]
    fn test_decode_rejects_oversized_message() {
        let mut buf = BytesMut::new();
        buf.put_slice(&encode_u32(1024));
        buf.put_u8(MessageType::Audio.code());
        buf.put_u8(0);

        let err = decode_message(&mut buf, 64).unwrap_err();
        assert!(matches!(
            err,
            FrameError::MessageTooLarge {
                size: 1024,
                max: 64
            }
        ));
    }

    #[test]
    fn test_header_only_message() {
        let mut buf = BytesMut::from(Message::new(MessageType::Reset, false).as_bytes());
        let msg = decode_message(&mut buf, DEFAULT_MAX_MESSAGE)
            .unwrap()
            .unwrap();
        assert_eq!(msg.message_type(), Some(MessageType::Reset));
        assert_eq!(msg.data_length(), 0);
        assert!(buf.is_empty());
    }
}
