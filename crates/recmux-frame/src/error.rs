use std::os::fd::RawFd;

use recmux_transport::TransportError;

/// Errors that can occur while framing, queueing or multiplexing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Transport-level error (descriptor flags, readiness wait).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An unrecoverable I/O error on a queue's descriptor.
    #[error("I/O error on fd {fd}: {source}")]
    Io { fd: RawFd, source: std::io::Error },

    /// The peer end of the pipe is gone.
    #[error("broken pipe on fd {fd}")]
    BrokenPipe { fd: RawFd },

    /// A length prefix smaller than the message header.
    #[error("invalid message length {len} (header alone is {min} bytes)")]
    InvalidLength { len: usize, min: usize },

    /// A length prefix above the configured maximum.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// Whether the error means the peer process can no longer be reached.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, FrameError::BrokenPipe { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
