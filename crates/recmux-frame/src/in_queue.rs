use std::collections::vec_deque::{self, VecDeque};
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, RawFd};

use bytes::BytesMut;
use recmux_transport::PipeEnd;
use tracing::{debug, trace, warn};

use crate::codec::{decode_message, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Receive side of one pipe: turns a byte stream into complete messages.
///
/// The queue starts disabled. [`InQueue::enable`] hands it a descriptor,
/// which it owns until [`InQueue::disable`]. Completed messages stay
/// available after EOF and after disabling, so callers can drain them.
pub struct InQueue {
    messages: VecDeque<Message>,
    buf: BytesMut,
    pipe: Option<PipeEnd>,
    eof: bool,
    suspended: bool,
    name: String,
    config: FrameConfig,
}

impl InQueue {
    /// Create a disabled queue with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a disabled queue with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            messages: VecDeque::new(),
            buf: BytesMut::new(),
            pipe: None,
            eof: false,
            suspended: false,
            name: String::new(),
            config,
        }
    }

    /// Attach a name used in log output.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind the queue to a descriptor and start reading from it.
    ///
    /// The descriptor should be in non-blocking mode. Any previously bound
    /// descriptor is closed and the EOF flag is reset.
    pub fn enable(&mut self, pipe: PipeEnd) {
        debug!(name = %self.name, fd = pipe.as_raw_fd(), "in-queue enabled");
        self.pipe = Some(pipe);
        self.buf = BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY);
        self.eof = false;
    }

    /// Close the descriptor and drop partially received bytes.
    ///
    /// Completed messages are kept.
    pub fn disable(&mut self) {
        if let Some(pipe) = self.pipe.take() {
            debug!(name = %self.name, fd = pipe.as_raw_fd(), "in-queue disabled");
        }
        self.buf.clear();
    }

    /// Make the multiplexer and [`InQueue::flush`] skip this queue.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Undo [`InQueue::suspend`].
    pub fn release(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_enabled(&self) -> bool {
        self.pipe.is_some()
    }

    /// Descriptor of the queue, if enabled.
    pub fn fd(&self) -> Option<RawFd> {
        self.pipe.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Whether the peer closed its end.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Read what the descriptor has and queue every completed message.
    ///
    /// Stops when the descriptor would block, after a short read, or at EOF.
    /// Does nothing while suspended, disabled, or after EOF. A read error or
    /// a malformed length prefix is fatal for the descriptor: EOF is set and
    /// the error is returned.
    pub fn flush(&mut self) -> Result<()> {
        if self.suspended || self.eof {
            return Ok(());
        }
        let Some(fd) = self.fd() else {
            return Ok(());
        };

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let read = match self.pipe.as_mut() {
                Some(pipe) => pipe.read(&mut chunk),
                None => return Ok(()),
            };

            match read {
                Ok(0) => {
                    self.eof = true;
                    if !self.buf.is_empty() {
                        debug!(
                            name = %self.name,
                            fd,
                            pending = self.buf.len(),
                            "eof with partial message buffered"
                        );
                    }
                    debug!(name = %self.name, fd, "in-queue reached eof");
                    return Ok(());
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    if let Err(err) = self.parse_buffered() {
                        warn!(name = %self.name, fd, %err, "malformed input, closing queue");
                        self.eof = true;
                        return Err(err);
                    }
                    if n < chunk.len() {
                        return Ok(());
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(name = %self.name, fd, %err, "read failed, closing queue");
                    self.eof = true;
                    return Err(FrameError::Io { fd, source: err });
                }
            }
        }
    }

    fn parse_buffered(&mut self) -> Result<()> {
        while let Some(msg) = decode_message(&mut self.buf, self.config.max_message_size)? {
            trace!(
                name = %self.name,
                type_code = msg.type_code(),
                len = msg.total_length(),
                "message received"
            );
            self.messages.push_back(msg);
        }
        Ok(())
    }

    /// Whether no completed message is waiting.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of completed messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Bytes received but not yet part of a completed message.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Oldest completed message.
    pub fn front(&self) -> Option<&Message> {
        self.messages.front()
    }

    /// Take the oldest completed message.
    pub fn pop_front(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    /// Take every completed message, oldest first.
    pub fn drain(&mut self) -> vec_deque::Drain<'_, Message> {
        self.messages.drain(..)
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, Message> {
        self.messages.iter()
    }
}

impl Default for InQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InQueue")
            .field("name", &self.name)
            .field("fd", &self.fd())
            .field("messages", &self.messages.len())
            .field("buffered", &self.buf.len())
            .field("eof", &self.eof)
            .field("suspended", &self.suspended)
            .finish()
    }
}
