use std::os::fd::RawFd;

/// Errors that can occur in pipe transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create a pipe.
    #[error("failed to create pipe: {0}")]
    Pipe(std::io::Error),

    /// Failed to read or change descriptor flags.
    #[error("fcntl on fd {fd} failed: {source}")]
    Fcntl { fd: RawFd, source: std::io::Error },

    /// The readiness wait itself failed.
    #[error("readiness wait failed: {0}")]
    Select(std::io::Error),

    /// The descriptor cannot be represented in an `fd_set`.
    #[error("descriptor {fd} exceeds the select limit (max {max})")]
    FdOutOfRange { fd: RawFd, max: RawFd },

    /// An I/O error occurred on a pipe.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
