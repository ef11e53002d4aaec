use std::cmp::min;
use std::fmt;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::posix;

const INTERRUPTIBLE_SLICE: Duration = Duration::from_secs(1);

/// Exit status of a child process.
///
/// This is an opaque type that wraps the raw status reported by `waitpid()`. Use the
/// provided methods to query it.
#[derive(Eq, PartialEq, Hash, Copy, Clone)]
pub struct ExitStatus(Option<i32>);

impl ExitStatus {
    pub(crate) fn from_raw(raw: i32) -> ExitStatus {
        ExitStatus(Some(raw))
    }

    /// Status of a child that was reaped by someone else, so its real status is lost.
    pub(crate) fn undetermined() -> ExitStatus {
        ExitStatus(None)
    }

    /// True if the exit status of the process is 0.
    pub fn success(&self) -> bool {
        self.code() == Some(0)
    }

    /// Returns the exit code if the process exited voluntarily.
    pub fn code(&self) -> Option<i32> {
        let raw = self.0?;
        libc::WIFEXITED(raw).then(|| libc::WEXITSTATUS(raw))
    }

    /// Returns the signal number if the process was killed by a signal.
    pub fn signal(&self) -> Option<i32> {
        let raw = self.0?;
        libc::WIFSIGNALED(raw).then(|| libc::WTERMSIG(raw))
    }

    /// True if the process was killed by the signal with the specified number.
    pub fn is_killed_by(&self, signum: i32) -> bool {
        self.signal() == Some(signum)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(raw) if libc::WIFEXITED(raw) => write!(f, "exit code {}", libc::WEXITSTATUS(raw)),
            Some(raw) if libc::WIFSIGNALED(raw) => write!(f, "signal {}", libc::WTERMSIG(raw)),
            Some(raw) => write!(f, "unrecognized wait status: {} {:#x}", raw, raw),
            None => write!(f, "undetermined exit status"),
        }
    }
}

impl fmt::Debug for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(raw) if libc::WIFEXITED(raw) => {
                write!(f, "ExitStatus(Exited({}))", libc::WEXITSTATUS(raw))
            }
            Some(raw) if libc::WIFSIGNALED(raw) => {
                write!(f, "ExitStatus(Signal({}))", libc::WTERMSIG(raw))
            }
            Some(raw) => write!(f, "ExitStatus(Unknown({} {:#x}))", raw, raw),
            None => write!(f, "ExitStatus(Undetermined)"),
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum ProcessState {
    Running,
    Finished(ExitStatus),
}

/// A handle to a running or finished child process.
///
/// A `ChildHandle` is created by [`Launch::start`] and owned by whoever supervises the
/// child. It moves from running to finished exactly once, the first time a wait
/// observes the exit. From then on the exit status is cached: no method issues another
/// `waitpid()` or `kill()` for that pid, so a recycled pid can never be signaled.
///
/// # Drop behavior
///
/// Dropping a handle whose child is still running waits for the child to finish,
/// unless [`detach`](Self::detach) has been called.
///
/// [`Launch::start`]: crate::Launch::start
pub struct ChildHandle {
    pid: u32,
    state: ProcessState,
    detached: bool,
}

impl ChildHandle {
    pub(crate) fn new(pid: u32) -> ChildHandle {
        ChildHandle {
            pid,
            state: ProcessState::Running,
            detached: false,
        }
    }

    /// Returns the PID of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the exit status, if the child is known to have finished.
    ///
    /// This does not perform any system calls.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.state {
            ProcessState::Finished(status) => Some(status),
            ProcessState::Running => None,
        }
    }

    /// True until a wait has observed the child's exit.
    pub fn is_running(&self) -> bool {
        matches!(self.state, ProcessState::Running)
    }

    /// Check whether the child has finished, without blocking.
    ///
    /// Returns `Ok(None)` while the child is running. A recorded interrupt is
    /// reported as in [`wait`](Self::wait).
    pub fn poll(&mut self) -> io::Result<Option<ExitStatus>> {
        self.wait_timeout(Duration::ZERO)
    }

    /// Wait for the child to finish and return its exit status.
    ///
    /// If the child has already finished, returns the cached status immediately.
    ///
    /// Fails with [`io::ErrorKind::Interrupted`] if an interrupt was recorded by the
    /// handler from [`install_interrupt_handler`](crate::install_interrupt_handler)
    /// before or during the wait.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        loop {
            if let ProcessState::Finished(status) = self.state {
                return Ok(status);
            }
            if posix::interrupt_handler_installed() {
                // a blocking waitpid misses a signal that lands after the flag check
                if let Some(status) = self.wait_timeout(INTERRUPTIBLE_SLICE)? {
                    return Ok(status);
                }
                continue;
            }
            match self.waitpid(true) {
                // a handler installed by someone else ran
                Err(e) if e.raw_os_error() == Some(posix::EINTR) => continue,
                other => other?,
            }
        }
    }

    /// Wait for the child to finish, timing out after the specified duration.
    ///
    /// Returns `Ok(None)` if the timeout elapsed before the child finished. Interrupts
    /// are reported the same way as in [`wait`](Self::wait).
    pub fn wait_timeout(&mut self, dur: Duration) -> io::Result<Option<ExitStatus>> {
        if let ProcessState::Finished(status) = self.state {
            return Ok(Some(status));
        }

        let deadline = Instant::now() + dur;
        let mut delay = Duration::from_millis(1);

        loop {
            if posix::take_interrupt() {
                return Err(io::ErrorKind::Interrupted.into());
            }
            self.waitpid(false)?;
            if let ProcessState::Finished(status) = self.state {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline.duration_since(now);
            thread::sleep(min(delay, remaining));
            delay = min(delay * 2, Duration::from_millis(100));
        }
    }

    /// Terminate the child by sending `SIGTERM`.
    ///
    /// Does nothing if the child is known to have finished.
    pub fn terminate(&mut self) -> io::Result<()> {
        self.send_signal(posix::SIGTERM)
    }

    /// Forcibly kill the child by sending `SIGKILL`.
    ///
    /// Safe to call any number of times. It does nothing once the child is known to
    /// have finished, and a child that exited but was not yet reaped is a zombie that
    /// accepts the signal without effect.
    pub fn kill(&mut self) -> io::Result<()> {
        self.send_signal(posix::SIGKILL)
    }

    /// Mark the handle as detached, so dropping it won't wait for the child.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    fn send_signal(&mut self, signal: i32) -> io::Result<()> {
        match self.state {
            ProcessState::Finished(_) => Ok(()),
            ProcessState::Running => {
                debug!(pid = self.pid, signal, "sending signal");
                match posix::kill(self.pid, signal) {
                    // already gone
                    Err(e) if e.raw_os_error() == Some(posix::ESRCH) => Ok(()),
                    other => other,
                }
            }
        }
    }

    fn waitpid(&mut self, block: bool) -> io::Result<()> {
        if let ProcessState::Finished(_) = self.state {
            return Ok(());
        }
        match posix::waitpid(self.pid, if block { 0 } else { posix::WNOHANG }) {
            Ok((pid_out, raw)) if pid_out == self.pid => {
                let status = ExitStatus::from_raw(raw);
                debug!(pid = self.pid, %status, "child finished");
                self.state = ProcessState::Finished(status);
            }
            Ok(_) => {}
            Err(e) if e.raw_os_error() == Some(posix::ECHILD) => {
                // Someone else waited for the child. The PID no longer exists and we
                // cannot find its exit status.
                warn!(pid = self.pid, "child was reaped elsewhere, exit status lost");
                self.state = ProcessState::Finished(ExitStatus::undetermined());
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        if !self.detached && self.is_running() {
            while let Err(e) = self.waitpid(true) {
                if e.raw_os_error() != Some(posix::EINTR) {
                    break;
                }
            }
        }
    }
}

impl fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildHandle")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("detached", &self.detached)
            .finish()
    }
}
