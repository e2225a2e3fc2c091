use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use tracing::trace;

use crate::error::{Result, TransportError};

/// One end of a unidirectional pipe, owning its file descriptor.
///
/// The descriptor is closed when the `PipeEnd` is dropped. Reads and writes
/// go straight to the kernel; in non-blocking mode they fail with
/// [`std::io::ErrorKind::WouldBlock`] instead of waiting.
pub struct PipeEnd {
    inner: File,
}

impl PipeEnd {
    /// Take ownership of an already-open descriptor.
    pub fn from_owned(fd: OwnedFd) -> Self {
        Self {
            inner: File::from(fd),
        }
    }

    /// Toggle `O_NONBLOCK` on the descriptor.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        let fd = self.as_raw_fd();
        let flags = fcntl_get(fd, libc::F_GETFL)?;
        let updated = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if updated != flags {
            fcntl_set(fd, libc::F_SETFL, updated)?;
        }
        trace!(fd, nonblocking, "updated pipe blocking mode");
        Ok(())
    }

    /// Whether `O_NONBLOCK` is currently set.
    pub fn is_nonblocking(&self) -> Result<bool> {
        let flags = fcntl_get(self.as_raw_fd(), libc::F_GETFL)?;
        Ok(flags & libc::O_NONBLOCK != 0)
    }

    /// Mark the descriptor close-on-exec.
    pub fn set_cloexec(&self) -> Result<()> {
        let fd = self.as_raw_fd();
        let flags = fcntl_get(fd, libc::F_GETFD)?;
        if flags & libc::FD_CLOEXEC == 0 {
            fcntl_set(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC)?;
        }
        Ok(())
    }

    /// Give up ownership of the descriptor.
    pub fn into_owned(self) -> OwnedFd {
        OwnedFd::from(self.inner)
    }
}

impl From<OwnedFd> for PipeEnd {
    fn from(fd: OwnedFd) -> Self {
        Self::from_owned(fd)
    }
}

impl From<std::os::unix::net::UnixStream> for PipeEnd {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self::from_owned(OwnedFd::from(stream))
    }
}

impl AsRawFd for PipeEnd {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl AsFd for PipeEnd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl IntoRawFd for PipeEnd {
    fn into_raw_fd(self) -> RawFd {
        self.inner.into_raw_fd()
    }
}

impl Read for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for PipeEnd {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for PipeEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeEnd")
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

/// Create a pipe and return `(read_end, write_end)`.
///
/// Both ends are close-on-exec so that spawned children only see the
/// descriptors they are explicitly handed.
pub fn pipe() -> Result<(PipeEnd, PipeEnd)> {
    let mut fds: [RawFd; 2] = [-1, -1];

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    // SAFETY: `fds` is a valid two-element array for pipe2 to fill.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    // SAFETY: `fds` is a valid two-element array for pipe to fill.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };

    if rc != 0 {
        return Err(TransportError::Pipe(std::io::Error::last_os_error()));
    }

    // SAFETY: pipe(2) succeeded, so both descriptors are open and owned by us.
    let (reader, writer) = unsafe {
        (
            PipeEnd::from_owned(OwnedFd::from_raw_fd(fds[0])),
            PipeEnd::from_owned(OwnedFd::from_raw_fd(fds[1])),
        )
    };

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        reader.set_cloexec()?;
        writer.set_cloexec()?;
    }

    trace!(
        read_fd = reader.as_raw_fd(),
        write_fd = writer.as_raw_fd(),
        "created pipe"
    );
    Ok((reader, writer))
}

fn fcntl_get(fd: RawFd, cmd: libc::c_int) -> Result<libc::c_int> {
    // SAFETY: F_GETFL/F_GETFD only read descriptor state; `fd` is owned by the caller.
    let flags = unsafe { libc::fcntl(fd, cmd) };
    if flags < 0 {
        return Err(TransportError::Fcntl {
            fd,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(flags)
}

fn fcntl_set(fd: RawFd, cmd: libc::c_int, flags: libc::c_int) -> Result<()> {
    // SAFETY: F_SETFL/F_SETFD only update flags of a descriptor owned by the caller.
    if unsafe { libc::fcntl(fd, cmd, flags) } < 0 {
        return Err(TransportError::Fcntl {
            fd,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    #[test]
    fn test_pipe_roundtrip() {
        let (mut reader, mut writer) = pipe().unwrap();
        writer.write_all(b"hello").unwrap();

        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_pipe_ends_are_cloexec() {
        let (reader, writer) = pipe().unwrap();
        for end in [&reader, &writer] {
            let flags = fcntl_get(end.as_raw_fd(), libc::F_GETFD).unwrap();
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }

    #[test]
    fn test_nonblocking_read_would_block() {
        let (mut reader, _writer) = pipe().unwrap();
        assert!(!reader.is_nonblocking().unwrap());

        reader.set_nonblocking(true).unwrap();
        assert!(reader.is_nonblocking().unwrap());

        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);

        reader.set_nonblocking(false).unwrap();
        assert!(!reader.is_nonblocking().unwrap());
    }

    #[test]
    fn test_read_eof_after_writer_dropped() {
        let (mut reader, writer) = pipe().unwrap();
        drop(writer);

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_to_closed_reader_is_broken_pipe() {
        let (reader, mut writer) = pipe().unwrap();
        drop(reader);

        let err = writer.write(b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_into_owned_keeps_descriptor_open() {
        let (reader, mut writer) = pipe().unwrap();
        let fd = reader.as_raw_fd();
        let owned = reader.into_owned();
        assert_eq!(owned.as_raw_fd(), fd);

        writer.write_all(b"ok").unwrap();
        let mut reader = PipeEnd::from(owned);
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ok");
    }
}
