use std::os::fd::RawFd;
use std::time::Duration;

use tracing::trace;

use crate::error::{Result, TransportError};

/// Highest descriptor number (exclusive) that fits in an `fd_set`.
pub const MAX_SELECT_FD: RawFd = libc::FD_SETSIZE as RawFd;

/// A set of descriptors for the `select(2)` readiness wait.
pub struct FdSet {
    raw: libc::fd_set,
    max_fd: Option<RawFd>,
}

impl FdSet {
    /// Create an empty set.
    pub fn new() -> Self {
        // SAFETY: fd_set is a plain C struct; FD_ZERO initializes it fully.
        let raw = unsafe {
            let mut raw = std::mem::MaybeUninit::<libc::fd_set>::zeroed();
            libc::FD_ZERO(raw.as_mut_ptr());
            raw.assume_init()
        };
        Self { raw, max_fd: None }
    }

    /// Add a descriptor.
    ///
    /// Negative descriptors and descriptors at or above [`MAX_SELECT_FD`]
    /// cannot be waited on and are rejected.
    pub fn insert(&mut self, fd: RawFd) -> Result<()> {
        if !(0..MAX_SELECT_FD).contains(&fd) {
            return Err(TransportError::FdOutOfRange {
                fd,
                max: MAX_SELECT_FD - 1,
            });
        }
        // SAFETY: `fd` is within [0, FD_SETSIZE) and `raw` is initialized.
        unsafe { libc::FD_SET(fd, &mut self.raw) };
        self.max_fd = Some(self.max_fd.map_or(fd, |max| max.max(fd)));
        Ok(())
    }

    /// Whether `fd` is in the set.
    pub fn contains(&self, fd: RawFd) -> bool {
        if !(0..MAX_SELECT_FD).contains(&fd) {
            return false;
        }
        // SAFETY: `fd` is within [0, FD_SETSIZE) and `raw` is initialized.
        unsafe { libc::FD_ISSET(fd, &self.raw) }
    }

    /// Remove every descriptor.
    pub fn clear(&mut self) {
        // SAFETY: `raw` is a valid fd_set.
        unsafe { libc::FD_ZERO(&mut self.raw) };
        self.max_fd = None;
    }

    /// Whether no descriptor was inserted.
    pub fn is_empty(&self) -> bool {
        self.max_fd.is_none()
    }

    /// Largest inserted descriptor.
    pub fn max_fd(&self) -> Option<RawFd> {
        self.max_fd
    }
}

impl Default for FdSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members: Vec<RawFd> = match self.max_fd {
            Some(max) => (0..=max).filter(|fd| self.contains(*fd)).collect(),
            None => Vec::new(),
        };
        f.debug_struct("FdSet").field("fds", &members).finish()
    }
}

/// Wait until a descriptor in `read` is readable or one in `write` is writable.
///
/// On return both sets hold only the ready descriptors. `timeout = None`
/// blocks indefinitely. Returns the number of ready descriptors; `0` means
/// the timeout elapsed or the wait was interrupted by a signal, in which
/// case both sets are cleared.
pub fn select(read: &mut FdSet, write: &mut FdSet, timeout: Option<Duration>) -> Result<usize> {
    let nfds = match (read.max_fd, write.max_fd) {
        (Some(r), Some(w)) => r.max(w) + 1,
        (Some(m), None) | (None, Some(m)) => m + 1,
        (None, None) => 0,
    };

    let mut tv = timeout.map(|d| libc::timeval {
        tv_sec: d.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_usec: d.subsec_micros() as libc::suseconds_t,
    });
    let tv_ptr = tv
        .as_mut()
        .map_or(std::ptr::null_mut(), |tv| tv as *mut libc::timeval);

    trace!(nfds, ?timeout, "waiting for descriptor readiness");

    // SAFETY: both fd_sets are initialized and only contain descriptors below
    // FD_SETSIZE; `tv_ptr` is either null or points to a live timeval.
    let rc = unsafe {
        libc::select(
            nfds,
            &mut read.raw,
            &mut write.raw,
            std::ptr::null_mut(),
            tv_ptr,
        )
    };

    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            read.clear();
            write.clear();
            return Ok(0);
        }
        return Err(TransportError::Select(err));
    }
    if rc == 0 {
        read.clear();
        write.clear();
    }
    Ok(rc as usize)
}
