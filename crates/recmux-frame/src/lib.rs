//! Typed, length-prefixed messages and the queues that move them over pipes.
//!
//! Every message on the wire is:
//! - A 4-byte total length (header included, little-endian)
//! - A 1-byte message type
//! - A 1-byte urgent flag
//!
//! followed by the payload. [`InQueue`] slices a byte stream into messages,
//! [`OutQueue`] writes them back out tolerating partial writes, and [`Mux`]
//! drives many queues from one blocking readiness wait.

pub mod codec;
pub mod error;
pub mod in_queue;
pub mod message;
pub mod mux;
pub mod out_queue;

pub use codec::{
    decode_message, ByteOrder, FrameConfig, DEFAULT_MAX_MESSAGE, HEADER_SIZE, NUMERIC_WIDTH,
    WIRE_BYTE_ORDER,
};
pub use error::{FrameError, Result};
pub use in_queue::InQueue;
pub use message::{Message, MessageType};
pub use mux::Mux;
pub use out_queue::OutQueue;
