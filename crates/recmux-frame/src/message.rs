use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{encode_u32, peek_length, HEADER_SIZE, NUMERIC_WIDTH};
use crate::error::{FrameError, Result};

const TYPE_OFFSET: usize = 4;
const URGENT_OFFSET: usize = 5;

/// Message kinds understood by both ends of the recognizer pipes.
///
/// The discriminants are the type byte on the wire and must never be
/// reordered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Chunk of audio samples (gui -> recognizer).
    Audio = 0,
    /// End of the audio stream (gui -> recognizer).
    AudioEnd = 1,
    /// Reset the recognizer (gui -> recognizer).
    Reset = 2,
    /// Block of acoustic probabilities.
    Probs = 3,
    /// End of probabilities.
    ProbsEnd = 4,
    /// Recognizer is ready for input.
    Ready = 5,
    /// Recognized text.
    Recog = 6,
    /// End of recognition output.
    RecogEnd = 7,
    /// Decoder setting, payload `"<name> <value>"`.
    DecoderSetting = 8,
    DecoderPause = 9,
    DecoderUnpause = 10,
    AdaptOn = 11,
    AdaptOff = 12,
    AdaptReset = 13,
    AdaptCalc = 14,
    AdaptCancelled = 15,
    StateHistory = 16,
    Debug = 17,
    /// Free-form text for the user (recognizer -> gui).
    UserMessage = 18,
}

impl MessageType {
    /// Every message type, in wire-code order.
    pub const ALL: [MessageType; 19] = [
        MessageType::Audio,
        MessageType::AudioEnd,
        MessageType::Reset,
        MessageType::Probs,
        MessageType::ProbsEnd,
        MessageType::Ready,
        MessageType::Recog,
        MessageType::RecogEnd,
        MessageType::DecoderSetting,
        MessageType::DecoderPause,
        MessageType::DecoderUnpause,
        MessageType::AdaptOn,
        MessageType::AdaptOff,
        MessageType::AdaptReset,
        MessageType::AdaptCalc,
        MessageType::AdaptCancelled,
        MessageType::StateHistory,
        MessageType::Debug,
        MessageType::UserMessage,
    ];

    /// The type byte on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a type by its wire byte.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Stable kebab-case name.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Audio => "audio",
            MessageType::AudioEnd => "audio-end",
            MessageType::Reset => "reset",
            MessageType::Probs => "probs",
            MessageType::ProbsEnd => "probs-end",
            MessageType::Ready => "ready",
            MessageType::Recog => "recog",
            MessageType::RecogEnd => "recog-end",
            MessageType::DecoderSetting => "decoder-setting",
            MessageType::DecoderPause => "decoder-pause",
            MessageType::DecoderUnpause => "decoder-unpause",
            MessageType::AdaptOn => "adapt-on",
            MessageType::AdaptOff => "adapt-off",
            MessageType::AdaptReset => "adapt-reset",
            MessageType::AdaptCalc => "adapt-calc",
            MessageType::AdaptCancelled => "adapt-cancelled",
            MessageType::StateHistory => "state-history",
            MessageType::Debug => "debug",
            MessageType::UserMessage => "user-message",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, u8> {
        Self::from_code(code).ok_or(code)
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("unknown message type: {s}"))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One typed, length-prefixed protocol message.
///
/// The message is stored in its wire form: bytes 0-3 always hold the total
/// buffer length, byte 4 the type and byte 5 the urgent flag. Every mutator
/// ends with [`Message::reframe`], so the length prefix can't go stale.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    buf: BytesMut,
}

impl Message {
    /// Create a header-only message.
    pub fn new(kind: MessageType, urgent: bool) -> Self {
        Self::with_type_code(kind.code(), urgent)
    }

    /// Create a header-only message with a raw type byte.
    pub fn with_type_code(code: u8, urgent: bool) -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_bytes(0, NUMERIC_WIDTH);
        buf.put_u8(code);
        buf.put_u8(u8::from(urgent));
        let mut msg = Self { buf };
        msg.reframe();
        msg
    }

    /// Urgent decoder-setting message with an ASCII `"<name> <value>"` payload.
    pub fn decoder_setting(name: &str, value: impl fmt::Display) -> Self {
        let mut msg = Self::new(MessageType::DecoderSetting, true);
        msg.append(format!("{name} {value}"));
        msg
    }

    /// Parse one complete message from its wire bytes.
    ///
    /// The length prefix must match `bytes.len()` exactly.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let total = peek_length(bytes).unwrap_or_default();
        if bytes.len() < HEADER_SIZE || total < HEADER_SIZE {
            return Err(FrameError::InvalidLength {
                len: total.min(bytes.len()),
                min: HEADER_SIZE,
            });
        }
        if total != bytes.len() {
            return Err(FrameError::InvalidLength {
                len: total,
                min: HEADER_SIZE,
            });
        }
        Ok(Self::from_wire_unchecked(BytesMut::from(bytes)))
    }

    /// Wrap bytes whose length prefix the caller already checked.
    pub(crate) fn from_wire_unchecked(buf: BytesMut) -> Self {
        debug_assert!(buf.len() >= HEADER_SIZE);
        Self { buf }
    }

    pub fn set_type(&mut self, kind: MessageType) {
        self.set_type_code(kind.code());
    }

    pub fn set_type_code(&mut self, code: u8) {
        self.buf[TYPE_OFFSET] = code;
    }

    pub fn set_urgent(&mut self, urgent: bool) {
        self.buf[URGENT_OFFSET] = u8::from(urgent);
    }

    /// Drop the payload, keeping type and urgent flag.
    pub fn clear_data(&mut self) {
        self.buf.truncate(HEADER_SIZE);
        self.reframe();
    }

    /// Append raw payload bytes.
    pub fn append(&mut self, data: impl AsRef<[u8]>) {
        self.buf.extend_from_slice(data.as_ref());
        self.reframe();
    }

    /// Append a 4-byte unsigned integer.
    pub fn append_u32(&mut self, value: u32) {
        self.buf.put_slice(&encode_u32(value));
        self.reframe();
    }

    /// Append a 4-byte IEEE-754 float.
    pub fn append_f32(&mut self, value: f32) {
        self.buf.put_slice(&encode_u32(value.to_bits()));
        self.reframe();
    }

    /// Rewrite the length prefix from the current buffer size.
    ///
    /// A message must fit the 4-byte prefix. Past `u32::MAX` bytes the
    /// prefix saturates and no longer matches the buffer; receivers reject
    /// such a message long before, through `FrameConfig::max_message_size`.
    fn reframe(&mut self) {
        debug_assert!(self.buf.len() >= HEADER_SIZE);
        debug_assert!(
            fits_length_prefix(self.buf.len()),
            "message of {} bytes overflows the length prefix",
            self.buf.len()
        );
        let total = u32::try_from(self.buf.len()).unwrap_or(u32::MAX);
        self.buf[..NUMERIC_WIDTH].copy_from_slice(&encode_u32(total));
    }

    /// Raw type byte.
    pub fn type_code(&self) -> u8 {
        self.buf[TYPE_OFFSET]
    }

    /// Decoded type, or `None` for a byte outside [`MessageType`].
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_code(self.type_code())
    }

    pub fn urgent(&self) -> bool {
        self.buf[URGENT_OFFSET] != 0
    }

    /// Value of the length prefix.
    pub fn total_length(&self) -> usize {
        peek_length(&self.buf).unwrap_or_default()
    }

    /// Payload size in bytes.
    pub fn data_length(&self) -> usize {
        self.buf.len() - HEADER_SIZE
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[HEADER_SIZE..]
    }

    /// Payload bytes for in-place editing. The length can't change here.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[HEADER_SIZE..]
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn data_as_string(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.data())
    }

    /// Full wire form: header followed by payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the message, returning its wire form.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Whether a message of `len` bytes can carry its own length prefix.
fn fits_length_prefix(len: usize) -> bool {
    u32::try_from(len).is_ok()
}

impl Default for Message {
    fn default() -> Self {
        Self::new(MessageType::Audio, false)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Message");
        match self.message_type() {
            Some(kind) => dbg.field("type", &kind),
            None => dbg.field("type", &self.type_code()),
        };
        dbg.field("urgent", &self.urgent())
            .field("data_length", &self.data_length())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_u32;

    #[test]
    fn test_length_prefix_limit() {
        assert!(fits_length_prefix(HEADER_SIZE));
        assert!(fits_length_prefix(u32::MAX as usize));
        #[cfg(target_pointer_width = "64")]
        assert!(!fits_length_prefix(u32::MAX as usize + 1));
    }

    #[test]
    fn test_new_message_is_header_only() {
        let msg = Message::new(MessageType::Ready, true);
        assert_eq!(msg.total_length(), HEADER_SIZE);
        assert_eq!(msg.as_bytes(), &[6, 0, 0, 0, 5, 1]);
        assert_eq!(msg.message_type(), Some(MessageType::Ready));
        assert!(msg.urgent());
        assert_eq!(msg.data_length(), 0);
    }

    #[test]
    fn test_length_tracks_every_append() {
        let mut msg = Message::new(MessageType::Audio, false);
        let chunks: [&[u8]; 4] = [b"a", b"", b"0123456789", &[0xff; 300]];
        let mut expected = HEADER_SIZE;

        for chunk in chunks {
            msg.append(chunk);
            expected += chunk.len();
            assert_eq!(msg.total_length(), expected);
            assert_eq!(msg.as_bytes().len(), expected);
        }

        msg.append_u32(7);
        msg.append_f32(1.5);
        expected += 2 * NUMERIC_WIDTH;
        assert_eq!(msg.total_length(), expected);
        assert_eq!(msg.data_length(), expected - HEADER_SIZE);
    }

    #[test]
    fn test_numeric_append_encoding() {
        let mut msg = Message::new(MessageType::Probs, false);
        msg.append_u32(0x0a0b_0c0d);
        msg.append_f32(-2.25);

        let data = msg.data();
        assert_eq!(&data[..4], &[0x0d, 0x0c, 0x0b, 0x0a]);
        let bits = decode_u32(data[4..8].try_into().unwrap());
        assert_eq!(f32::from_bits(bits), -2.25);
    }

    #[test]
    fn test_clear_data_restores_header_length() {
        let mut msg = Message::new(MessageType::Recog, false);
        msg.append("some text");
        msg.clear_data();

        assert_eq!(msg.total_length(), HEADER_SIZE);
        assert_eq!(msg.message_type(), Some(MessageType::Recog));
    }

    #[test]
    fn test_set_type_and_urgent_keep_length() {
        let mut msg = Message::new(MessageType::Audio, false);
        msg.append(b"xyz");
        msg.set_type(MessageType::Debug);
        msg.set_urgent(true);

        assert_eq!(msg.message_type(), Some(MessageType::Debug));
        assert!(msg.urgent());
        assert_eq!(msg.total_length(), HEADER_SIZE + 3);
        assert_eq!(msg.data(), b"xyz");
    }

    #[test]
    fn test_decoder_setting_payload() {
        let msg = Message::decoder_setting("beam", 15);
        assert_eq!(msg.message_type(), Some(MessageType::DecoderSetting));
        assert!(msg.urgent());
        assert_eq!(msg.data_as_string(), "beam 15");
        assert_eq!(msg.total_length(), HEADER_SIZE + "beam 15".len());
    }

    #[test]
    fn test_from_wire_roundtrip() {
        let mut msg = Message::new(MessageType::UserMessage, false);
        msg.append("hello");

        let parsed = Message::from_wire(msg.as_bytes()).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.data_as_string(), "hello");
    }

    #[test]
    fn test_from_wire_rejects_length_mismatch() {
        let mut msg = Message::new(MessageType::Recog, false);
        msg.append("hello");
        let mut bytes = msg.as_bytes().to_vec();
        bytes.pop();

        assert!(matches!(
            Message::from_wire(&bytes),
            Err(FrameError::InvalidLength { .. })
        ));
        assert!(matches!(
            Message::from_wire(&[1, 0]),
            Err(FrameError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_unknown_type_code_is_preserved() {
        let msg = Message::with_type_code(200, false);
        assert_eq!(msg.type_code(), 200);
        assert_eq!(msg.message_type(), None);
    }

    #[test]
    fn test_message_type_codes_and_names() {
        for (code, kind) in MessageType::ALL.iter().enumerate() {
            assert_eq!(kind.code() as usize, code);
            assert_eq!(MessageType::from_code(code as u8), Some(*kind));
            assert_eq!(kind.name().parse::<MessageType>().unwrap(), *kind);
        }
        assert_eq!(MessageType::from_code(19), None);
        assert_eq!(
            "DECODER_SETTING".parse::<MessageType>().unwrap(),
            MessageType::DecoderSetting
        );
        assert!("nope".parse::<MessageType>().is_err());
    }
}
