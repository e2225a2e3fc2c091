use std::time::{Duration, Instant};

use recmux_transport::{select, FdSet};
use tracing::trace;

use crate::error::Result;
use crate::in_queue::InQueue;
use crate::out_queue::OutQueue;

/// Drives a set of queues from one blocking readiness wait.
///
/// The multiplexer only borrows its queues; build one per wait cycle from
/// whatever queues are live, call [`Mux::wait_and_flush`], drop it, then
/// drain the in-queues.
#[derive(Default)]
pub struct Mux<'a> {
    in_queues: Vec<&'a mut InQueue>,
    out_queues: Vec<&'a mut OutQueue>,
}

impl<'a> Mux<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch an in-queue for readability.
    pub fn add_in_queue(&mut self, queue: &'a mut InQueue) -> &mut Self {
        self.in_queues.push(queue);
        self
    }

    /// Watch an out-queue for writability while it has data.
    pub fn add_out_queue(&mut self, queue: &'a mut OutQueue) -> &mut Self {
        self.out_queues.push(queue);
        self
    }

    /// Wait and flush queues until an in-queue has messages or EOF pending.
    ///
    /// Returns immediately if an in-queue already has something, or if no
    /// registered queue has a descriptor worth waiting on.
    pub fn wait_and_flush(&mut self) -> Result<()> {
        self.run(None).map(|_| ())
    }

    /// Like [`Mux::wait_and_flush`], but gives up after `timeout`.
    ///
    /// Returns `true` if an in-queue has messages or EOF pending.
    pub fn wait_and_flush_timeout(&mut self, timeout: Duration) -> Result<bool> {
        self.run(Some(Instant::now() + timeout))
    }

    fn run(&mut self, deadline: Option<Instant>) -> Result<bool> {
        loop {
            if self.input_pending() {
                return Ok(true);
            }

            let (mut read_set, mut write_set) = self.create_fd_sets()?;
            if read_set.is_empty() && write_set.is_empty() {
                trace!("no descriptors to wait on");
                return Ok(false);
            }

            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            let ready = select(&mut read_set, &mut write_set, timeout)?;
            if ready == 0 {
                continue;
            }

            for queue in self.out_queues.iter_mut() {
                if queue.fd().is_some_and(|fd| write_set.contains(fd)) {
                    queue.flush()?;
                }
            }
            for queue in self.in_queues.iter_mut() {
                if queue.fd().is_some_and(|fd| read_set.contains(fd)) {
                    queue.flush()?;
                }
            }
        }
    }

    fn input_pending(&self) -> bool {
        self.in_queues
            .iter()
            .any(|queue| !queue.is_suspended() && (!queue.is_empty() || queue.eof()))
    }

    fn create_fd_sets(&self) -> Result<(FdSet, FdSet)> {
        let mut read_set = FdSet::new();
        let mut write_set = FdSet::new();

        for queue in &self.in_queues {
            if queue.is_suspended() || queue.eof() {
                continue;
            }
            if let Some(fd) = queue.fd() {
                read_set.insert(fd)?;
            }
        }
        for queue in &self.out_queues {
            if !queue.has_pending() {
                continue;
            }
            if let Some(fd) = queue.fd() {
                write_set.insert(fd)?;
            }
        }

        Ok((read_set, write_set))
    }
}
