use std::collections::vec_deque::{self, VecDeque};
use std::io::{ErrorKind, Write};
use std::os::fd::{AsRawFd, RawFd};

use bytes::Bytes;
use recmux_transport::PipeEnd;
use tracing::{debug, trace};

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Send side of one pipe: writes queued messages in FIFO order.
///
/// One message at a time is moved into an internal send buffer; a
/// non-blocking descriptor may accept only part of it, and the rest goes
/// out on a later [`OutQueue::send_next`].
pub struct OutQueue {
    messages: VecDeque<Message>,
    buf: Bytes,
    sent: usize,
    pipe: Option<PipeEnd>,
    name: String,
}

impl OutQueue {
    /// Create a disabled queue.
    pub fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            buf: Bytes::new(),
            sent: 0,
            pipe: None,
            name: String::new(),
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

    /// Bind the queue to the descriptor messages are written to.
    pub fn enable(&mut self, pipe: PipeEnd) {
        debug!(name = %self.name, fd = pipe.as_raw_fd(), "out-queue enabled");
        self.pipe = Some(pipe);
    }

    /// Close the descriptor and drop everything not yet written.
    pub fn disable(&mut self) {
        if let Some(pipe) = self.pipe.take() {
            debug!(
                name = %self.name,
                fd = pipe.as_raw_fd(),
                dropped = self.messages.len(),
                "out-queue disabled"
            );
        }
        self.messages.clear();
        self.buf = Bytes::new();
        self.sent = 0;
    }

    pub fn is_enabled(&self) -> bool {
        self.pipe.is_some()
    }

    /// Descriptor of the queue, if enabled.
    pub fn fd(&self) -> Option<RawFd> {
        self.pipe.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Queue a message behind everything already pending.
    pub fn add_message(&mut self, msg: Message) {
        trace!(
            name = %self.name,
            type_code = msg.type_code(),
            urgent = msg.urgent(),
            len = msg.total_length(),
            "message queued"
        );
        self.messages.push_back(msg);
    }

    /// Move the oldest pending message into the send buffer.
    ///
    /// Does nothing while a message is still being sent. Returns whether
    /// there are bytes waiting in the send buffer afterwards.
    pub fn prepare_next(&mut self) -> bool {
        if self.sent < self.buf.len() {
            return true;
        }
        match self.messages.pop_front() {
            Some(msg) => {
                self.buf = msg.into_bytes();
                self.sent = 0;
                true
            }
            None => false,
        }
    }

    /// Write as much of the send buffer as the descriptor accepts.
    ///
    /// Returns `Ok(true)` once the whole message has been written (or there
    /// was nothing to send), `Ok(false)` if the descriptor would block or the
    /// queue is disabled. A vanished reader yields [`FrameError::BrokenPipe`].
    pub fn send_next(&mut self) -> Result<bool> {
        let Some(pipe) = self.pipe.as_mut() else {
            return Ok(false);
        };
        let fd = pipe.as_raw_fd();

        while self.sent < self.buf.len() {
            match pipe.write(&self.buf[self.sent..]) {
                Ok(0) => return Ok(false),
                Ok(n) => self.sent += n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    trace!(
                        name = %self.name,
                        fd,
                        sent = self.sent,
                        total = self.buf.len(),
                        "partial write"
                    );
                    return Ok(false);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    debug!(name = %self.name, fd, "peer closed pipe");
                    return Err(FrameError::BrokenPipe { fd });
                }
                Err(err) => return Err(FrameError::Io { fd, source: err }),
            }
        }

        self.buf = Bytes::new();
        self.sent = 0;
        Ok(true)
    }

    /// Send pending messages until the queue is empty or the descriptor
    /// would block. A disabled queue keeps its messages.
    pub fn flush(&mut self) -> Result<()> {
        if self.pipe.is_none() {
            return Ok(());
        }
        while self.prepare_next() {
            if !self.send_next()? {
                break;
            }
        }
        Ok(())
    }

    /// Drop every pending message. A message already being sent is kept.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Drop pending messages that are not urgent, keeping the order of the
    /// rest. A message already being sent is kept.
    pub fn clear_non_urgent(&mut self) {
        let before = self.messages.len();
        self.messages.retain(Message::urgent);
        trace!(
            name = %self.name,
            dropped = before - self.messages.len(),
            "non-urgent messages dropped"
        );
    }

    /// Whether no message is waiting to be moved into the send buffer.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of pending messages, not counting one in flight.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether any bytes remain to be written.
    pub fn has_pending(&self) -> bool {
        !self.messages.is_empty() || self.sent < self.buf.len()
    }

    /// Unsent bytes of the message currently being written.
    pub fn in_flight(&self) -> Option<&[u8]> {
        (self.sent < self.buf.len()).then(|| &self.buf[self.sent..])
    }

    /// Pending messages, oldest first.
    pub fn pending(&self) -> vec_deque::Iter<'_, Message> {
        self.messages.iter()
    }
}

impl Default for OutQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OutQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutQueue")
            .field("name", &self.name)
            .field("fd", &self.fd())
            .field("messages", &self.messages.len())
            .field("in_flight", &(self.buf.len() - self.sent))
            .finish()
    }
}
