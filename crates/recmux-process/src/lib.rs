//! Recognizer process supervision.
//!
//! Starts an external recognizer with its stdin/stdout wired to a
//! [`recmux_frame::OutQueue`]/[`recmux_frame::InQueue`] pair, sends the
//! decoder settings handshake, and tears the child down again.

pub mod error;
pub mod recognizer;
pub mod settings;
pub mod spawn;

pub use error::{ProcessError, Result};
pub use recognizer::{ProcessConfig, RecognizerProcess, IN_QUEUE_NAME, OUT_QUEUE_NAME};
pub use settings::{
    DecoderSettings, BEAM_SETTING, LMSCALE_SETTING, MAX_BEAM, MAX_LMSCALE, MIN_BEAM, MIN_LMSCALE,
};
pub use spawn::{spawn, Child};
