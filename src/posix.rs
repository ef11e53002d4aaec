use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{Error, Result};
use std::mem::{self, MaybeUninit};
use std::os::unix::ffi::OsStrExt;
#[cfg(target_vendor = "apple")]
use std::os::unix::io::AsRawFd;
use std::os::unix::io::FromRawFd;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

pub use libc::{ECHILD, EINTR, ESRCH, SIGINT, SIGKILL, SIGTERM, WNOHANG};

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

/// Create a pipe with both ends close-on-exec.
pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    #[cfg(not(target_vendor = "apple"))]
    check_err(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    #[cfg(target_vendor = "apple")]
    check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    let ends = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
    // no pipe2 here, so a concurrent fork can still see these without the flag
    #[cfg(target_vendor = "apple")]
    {
        set_cloexec(&ends.0)?;
        set_cloexec(&ends.1)?;
    }
    Ok(ends)
}

/// Fork the current process.
///
/// Returns `Some(pid)` in the parent and `None` in the child.
///
/// # Safety
///
/// The child may only call async-signal-safe functions until it execs or exits. In
/// particular it must not allocate or take locks.
pub unsafe fn fork() -> Result<Option<u32>> {
    let pid = check_err(unsafe { libc::fork() })?;
    Ok(if pid == 0 { None } else { Some(pid as u32) })
}

pub fn os_to_cstring(s: &OsStr) -> Result<CString> {
    // CString::new only fails on interior NUL, which exec can't express
    CString::new(s.as_bytes()).map_err(|_| Error::from_raw_os_error(libc::EINVAL))
}

struct CVec {
    // Individual C strings; they are not unused as rustc thinks, they
    // are pointed to by elements of self.ptrs.
    #[allow(dead_code)]
    strings: Vec<CString>,

    // nullptr-terminated vector of pointers to data inside
    // self.strings.
    ptrs: Vec<*const libc::c_char>,
}

impl CVec {
    fn new(slice: &[impl AsRef<OsStr>]) -> Result<CVec> {
        let strings = slice
            .iter()
            .map(|x| os_to_cstring(x.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let ptrs = strings
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Ok(CVec { strings, ptrs })
    }

    fn as_c_vec(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

/// Prepare an `execvp` call ahead of `fork()`.
///
/// All allocation happens here, in the parent. The returned closure only calls
/// `execvp`, so it is safe to invoke in a freshly forked child. It returns only if
/// exec fails.
pub fn prep_exec(cmd: &OsStr, argv: &[impl AsRef<OsStr>]) -> Result<impl FnOnce() -> Error> {
    let cmd = os_to_cstring(cmd)?;
    let argv = CVec::new(argv)?;
    Ok(move || {
        unsafe {
            libc::execvp(cmd.as_ptr(), argv.as_c_vec());
        }
        Error::last_os_error()
    })
}

pub fn chdir(dir: &CString) -> Result<()> {
    check_err(unsafe { libc::chdir(dir.as_ptr()) })?;
    Ok(())
}

pub fn _exit(status: u8) -> ! {
    unsafe { libc::_exit(status as libc::c_int) }
}

pub fn waitpid(pid: u32, flags: i32) -> Result<(u32, i32)> {
    let mut status = 0 as libc::c_int;
    let pid = check_err(unsafe {
        libc::waitpid(
            pid as libc::pid_t,
            &mut status as *mut libc::c_int,
            flags as libc::c_int,
        )
    })?;
    Ok((pid as u32, status))
}

pub fn kill(pid: u32, signal: i32) -> Result<()> {
    check_err(unsafe { libc::kill(pid as libc::pid_t, signal) })?;
    Ok(())
}

pub fn dup2(oldfd: i32, newfd: i32) -> Result<()> {
    check_err(unsafe { libc::dup2(oldfd, newfd) })?;
    Ok(())
}

#[cfg(target_vendor = "apple")]
fn set_cloexec(f: &File) -> Result<()> {
    let fd = f.as_raw_fd();
    let old = check_err(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    check_err(unsafe { libc::fcntl(fd, libc::F_SETFD, old | libc::FD_CLOEXEC) })?;
    Ok(())
}

pub fn reset_sigpipe() -> Result<()> {
    // This is called after forking to reset SIGPIPE handling to the
    // defaults that Unix programs expect. libstd ignores SIGPIPE, and
    // ignored signals survive exec, so the child would otherwise
    // inherit the parent's disposition.
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        check_err(libc::sigemptyset(set.as_mut_ptr()))?;
        let set = set.assume_init();
        let rc = libc::pthread_sigmask(libc::SIG_SETMASK, &set, ptr::null_mut());
        if rc != 0 {
            return Err(Error::from_raw_os_error(rc));
        }
        if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn note_interrupt(_signum: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install a handler for `signal` that records the delivery in a flag.
///
/// `SA_RESTART` is deliberately left unset, so a blocking `waitpid` in progress fails
/// with `EINTR` when the signal arrives.
pub fn install_interrupt_handler(signal: i32) -> Result<()> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = note_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = 0;
        check_err(libc::sigemptyset(&mut action.sa_mask))?;
        check_err(libc::sigaction(signal, &action, ptr::null_mut()))?;
    }
    HANDLER_INSTALLED.store(true, Ordering::SeqCst);
    Ok(())
}

pub fn interrupt_handler_installed() -> bool {
    HANDLER_INSTALLED.load(Ordering::SeqCst)
}

/// Returns whether an interrupt was recorded since the last call, clearing the flag.
pub fn take_interrupt() -> bool {
    INTERRUPTED.swap(false, Ordering::SeqCst)
}
