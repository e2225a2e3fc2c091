//! Framed pipe messaging for external recognizer processes.
//!
//! A GUI-side process talks to a speech recognizer over the recognizer's
//! stdin and stdout. Messages carry a small binary header (length, type,
//! urgent flag) and are moved by non-blocking queues that a single
//! `select`-based multiplexer drives.
//!
//! # Crate Structure
//!
//! - [`transport`]: pipes with owned descriptors and the readiness wait
//! - [`frame`]: messages, in/out queues and the multiplexer
//! - [`process`]: recognizer spawning and decoder settings (behind `process` feature)

/// Re-export transport types.
pub mod transport {
    pub use recmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use recmux_frame::*;
}

/// Re-export process types (requires `process` feature).
#[cfg(feature = "process")]
pub mod process {
    pub use recmux_process::*;
}
