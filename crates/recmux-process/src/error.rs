use recmux_frame::FrameError;
use recmux_transport::TransportError;

/// Errors that can occur while running a recognizer process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Frame-level error, including a broken pipe to the recognizer.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A decoder setting outside its allowed range.
    #[error("{name} value {value} is not in range {min}-{max}")]
    OutOfRange {
        name: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// The connect and script strings produced no program to run.
    #[error("recognizer command is empty")]
    EmptyCommand,

    /// The command line could not be split or contains a NUL byte.
    #[error("invalid recognizer command: {0}")]
    InvalidCommand(String),

    /// `fork` failed.
    #[error("failed to spawn recognizer: {0}")]
    Spawn(std::io::Error),

    /// The child could not execute the program.
    #[error("failed to execute {program}: {source}")]
    Exec {
        program: String,
        source: std::io::Error,
    },

    /// Waiting for the child failed.
    #[error("failed to reap recognizer (pid {pid}): {source}")]
    Wait { pid: i32, source: std::io::Error },

    /// The operation needs a running recognizer.
    #[error("recognizer is not running")]
    NotRunning,

    /// The recognizer's stdin was closed; nothing more can be sent.
    #[error("recognizer input is closed")]
    InputClosed,

    /// `start` was called while a child is still running.
    #[error("recognizer is already running (pid {0})")]
    AlreadyRunning(i32),
}

impl ProcessError {
    /// Whether the recognizer's stdin pipe is gone.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, ProcessError::Frame(err) if err.is_broken_pipe())
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;
