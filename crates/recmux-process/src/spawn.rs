use std::env;
use std::ffi::{CStr, CString};
use std::fs;
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use recmux_transport::{pipe, PipeEnd};
use tracing::{debug, warn};

use crate::error::{ProcessError, Result};

const EXEC_FAILED_EXIT: libc::c_int = 127;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A forked child with its stdin and stdout connected to pipes.
///
/// The parent ends of both pipes start out in blocking mode.
pub struct Child {
    pid: libc::pid_t,
    stdin: Option<PipeEnd>,
    stdout: Option<PipeEnd>,
    status: Option<ExitStatus>,
}

impl Child {
    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Take the write end connected to the child's stdin.
    pub fn take_stdin(&mut self) -> Option<PipeEnd> {
        self.stdin.take()
    }

    /// Take the read end connected to the child's stdout.
    pub fn take_stdout(&mut self) -> Option<PipeEnd> {
        self.stdout.take()
    }

    /// Non-blocking check for exit; reaps the child once it has exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        let mut raw = 0;
        // SAFETY: `pid` is our own unreaped child; WNOHANG only inspects its state.
        let ret = unsafe { libc::waitpid(self.pid, &mut raw, libc::WNOHANG) };
        if ret < 0 {
            return Err(ProcessError::Wait {
                pid: self.pid,
                source: io::Error::last_os_error(),
            });
        }
        if ret == 0 {
            return Ok(None);
        }
        let status = ExitStatus::from_raw(raw);
        self.status = Some(status);
        Ok(Some(status))
    }

    /// Block until the child exits.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = wait_blocking(self.pid)?;
        self.status = Some(status);
        Ok(status)
    }

    /// Stop the child and reap it.
    ///
    /// Closes the pipes, gives the child `grace` to exit on its own, then
    /// sends `SIGTERM`, waits `grace` again, and finally sends `SIGKILL`.
    pub fn terminate(&mut self, grace: Duration) -> Result<ExitStatus> {
        self.stdin = None;
        self.stdout = None;

        if let Some(status) = self.wait_timeout(grace)? {
            return Ok(status);
        }
        debug!(pid = self.pid, "recognizer still running, sending SIGTERM");
        self.signal(libc::SIGTERM);
        if let Some(status) = self.wait_timeout(grace)? {
            return Ok(status);
        }
        warn!(pid = self.pid, "recognizer ignored SIGTERM, sending SIGKILL");
        self.signal(libc::SIGKILL);
        self.wait()
    }

    fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }

    fn signal(&self, signal: libc::c_int) {
        // SAFETY: `pid` is our own child that has not been reaped yet.
        if unsafe { libc::kill(self.pid, signal) } != 0 {
            debug!(
                pid = self.pid,
                signal,
                err = %io::Error::last_os_error(),
                "kill failed"
            );
        }
    }
}

impl Drop for Child {
    fn drop(&mut self) {
        if self.status.is_none() {
            if let Err(err) = self.terminate(Duration::ZERO) {
                warn!(pid = self.pid, %err, "failed to reap recognizer on drop");
            }
        }
    }
}

impl std::fmt::Debug for Child {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Child")
            .field("pid", &self.pid)
            .field("stdin", &self.stdin)
            .field("stdout", &self.stdout)
            .field("status", &self.status)
            .finish()
    }
}

/// Fork and exec `argv`, with the child's stdin and stdout on fresh pipes.
///
/// `argv[0]` is looked up on `PATH` before forking. The child's stderr is
/// inherited, and `SIGPIPE` plus the signal mask are reset to defaults. If
/// the exec fails, the child reports `errno` over a close-on-exec status pipe
/// and leaves through `_exit`, so no parent state (stdio buffers, atexit
/// handlers) is run twice; the parent turns the report into
/// [`ProcessError::Exec`].
pub fn spawn(argv: &[String]) -> Result<Child> {
    let program = argv.first().ok_or(ProcessError::EmptyCommand)?;
    let path = resolve_program(program)?;
    let c_path = CString::new(path.into_os_string().into_vec())
        .map_err(|_| ProcessError::InvalidCommand(format!("argument contains NUL: {program}")))?;
    let c_argv = argv
        .iter()
        .map(|arg| {
            CString::new(arg.as_str())
                .map_err(|_| ProcessError::InvalidCommand(format!("argument contains NUL: {arg}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let mut argv_ptrs: Vec<*const libc::c_char> = c_argv.iter().map(|s| s.as_ptr()).collect();
    argv_ptrs.push(ptr::null());

    let (child_stdin, parent_stdin) = pipe()?;
    let (parent_stdout, child_stdout) = pipe()?;
    let (mut status_read, status_write) = pipe()?;

    // SAFETY: everything the child touches (program path, argv pointers, raw
    // fds) was set up before the fork. The child only calls dup2, fcntl,
    // signal, sigprocmask, execv, write and _exit, all async-signal-safe.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(ProcessError::Spawn(io::Error::last_os_error()));
    }
    if pid == 0 {
        // SAFETY: we are the freshly forked child.
        unsafe {
            child_exec(
                child_stdin.as_raw_fd(),
                child_stdout.as_raw_fd(),
                status_write.as_raw_fd(),
                &c_path,
                &argv_ptrs,
            )
        }
    }

    drop(child_stdin);
    drop(child_stdout);
    drop(status_write);

    if let Some(errno) = read_exec_status(&mut status_read)? {
        // The child has already called _exit; reap it before reporting.
        let _ = wait_blocking(pid);
        return Err(ProcessError::Exec {
            program: program.clone(),
            source: io::Error::from_raw_os_error(errno),
        });
    }

    debug!(pid, ?argv, "recognizer started");
    Ok(Child {
        pid,
        stdin: Some(parent_stdin),
        stdout: Some(parent_stdout),
        status: None,
    })
}

/// Child side of [`spawn`]: wire up stdio and exec. Never returns.
///
/// # Safety
///
/// Must only be called in the child right after `fork()`. `argv` must be a
/// null-terminated array of pointers to live C strings.
unsafe fn child_exec(
    stdin_fd: RawFd,
    stdout_fd: RawFd,
    status_fd: RawFd,
    path: &CStr,
    argv: &[*const libc::c_char],
) -> ! {
    if redirect(stdin_fd, libc::STDIN_FILENO) < 0 || redirect(stdout_fd, libc::STDOUT_FILENO) < 0 {
        report_exec_failure(status_fd);
    }
    if reset_signals() < 0 {
        report_exec_failure(status_fd);
    }

    libc::execv(path.as_ptr(), argv.as_ptr());
    report_exec_failure(status_fd);
}

/// Give the new program default signal state.
///
/// The Rust runtime ignores `SIGPIPE`, and ignored dispositions survive
/// exec; a recognizer must die when the parent closes its stdout.
unsafe fn reset_signals() -> libc::c_int {
    if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
        return -1;
    }
    let mut empty: libc::sigset_t = std::mem::zeroed();
    libc::sigemptyset(&mut empty);
    libc::sigprocmask(libc::SIG_SETMASK, &empty, ptr::null_mut())
}

/// Send `errno` to the parent and leave without running any exit handlers.
unsafe fn report_exec_failure(status_fd: RawFd) -> ! {
    let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    let bytes = errno.to_ne_bytes();
    let _ = libc::write(status_fd, bytes.as_ptr().cast(), bytes.len());
    libc::_exit(EXEC_FAILED_EXIT);
}

/// Find the file `program` names, searching `PATH` when it has no slash.
///
/// Done before forking since the lookup allocates.
fn resolve_program(program: &str) -> Result<PathBuf> {
    if program.contains('/') {
        return Ok(PathBuf::from(program));
    }
    let not_found = || ProcessError::Exec {
        program: program.to_string(),
        source: io::Error::from(ErrorKind::NotFound),
    };
    let search = env::var_os("PATH").ok_or_else(not_found)?;
    env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_found)
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// `dup2` that also clears close-on-exec when source and target coincide.
unsafe fn redirect(fd: RawFd, target: RawFd) -> libc::c_int {
    if fd == target {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 {
            return flags;
        }
        return libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC);
    }
    libc::dup2(fd, target)
}

/// Read the exec report: `None` if the pipe closed empty (exec succeeded).
fn read_exec_status(status_read: &mut PipeEnd) -> Result<Option<i32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match status_read.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ProcessError::Spawn(err)),
        }
    }
    match filled {
        0 => Ok(None),
        4 => Ok(Some(i32::from_ne_bytes(buf))),
        _ => Err(ProcessError::Spawn(io::Error::new(
            ErrorKind::InvalidData,
            "short exec status report from child",
        ))),
    }
}

fn wait_blocking(pid: libc::pid_t) -> Result<ExitStatus> {
    let mut raw = 0;
    loop {
        // SAFETY: `pid` is our own unreaped child.
        let ret = unsafe { libc::waitpid(pid, &mut raw, 0) };
        if ret >= 0 {
            return Ok(ExitStatus::from_raw(raw));
        }
        let err = io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(ProcessError::Wait { pid, source: err });
        }
    }
}
