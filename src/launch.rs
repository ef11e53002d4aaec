use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::LaunchError;
use crate::posix;
use crate::process::ChildHandle;

/// The command line of a child: the program followed by its arguments.
///
/// Displays as `[program, arg1, arg2]`, the form echoed back in outcome reports.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct CommandSpec(Vec<String>);

impl CommandSpec {
    pub fn new<I, S>(parts: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec(parts.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The program to execute, if any.
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Split off the last element, returning it with the command made of the rest.
    pub fn split_last(&self) -> Option<(&str, CommandSpec)> {
        let (last, rest) = self.0.split_last()?;
        Some((last.as_str(), CommandSpec(rest.to_vec())))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandSpec").field(&self.0).finish()
    }
}

/// What to do with the child's standard streams.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamPolicy {
    /// The child shares the caller's stdin, stdout and stderr.
    #[default]
    Inherit,

    /// Standard output goes to the named file, which is created or truncated. Stdin
    /// and stderr are inherited.
    OutputToFile(PathBuf),

    /// Standard input is read from an existing file and standard output goes to
    /// another file, created or truncated. Stderr is inherited.
    InputOutputFiles { input: PathBuf, output: PathBuf },
}

/// Builder for starting a single child process.
///
/// # Examples
///
/// ```no_run
/// # use childwarden::*;
/// # fn dummy() -> std::result::Result<(), LaunchError> {
/// let command = CommandSpec::new(["ls", "-l"]);
/// let mut child = Launch::new(&command)
///     .cwd("/tmp")
///     .streams(StreamPolicy::OutputToFile("listing.txt".into()))
///     .start()?;
/// # let _ = child.wait();
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct Launch<'a> {
    command: &'a CommandSpec,
    cwd: Option<PathBuf>,
    streams: StreamPolicy,
}

impl<'a> Launch<'a> {
    /// Prepare to run `command` in the caller's directory with inherited streams.
    pub fn new(command: &'a CommandSpec) -> Launch<'a> {
        Launch {
            command,
            cwd: None,
            streams: StreamPolicy::Inherit,
        }
    }

    /// Run the child in `dir` instead of the caller's working directory.
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Launch<'a> {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    pub fn streams(mut self, streams: StreamPolicy) -> Launch<'a> {
        self.streams = streams;
        self
    }

    /// Start the child.
    ///
    /// Everything that can be checked in advance is checked before forking: an empty
    /// command, a working directory that isn't a directory, and redirect files that
    /// can't be opened all fail without creating a process. If the program itself
    /// can't be executed, the short-lived forked child is reaped before the error is
    /// returned.
    pub fn start(self) -> Result<ChildHandle, LaunchError> {
        let program = self.command.program().ok_or(LaunchError::EmptyCommand)?;

        if let Some(dir) = &self.cwd
            && !dir.is_dir()
        {
            return Err(LaunchError::InvalidDirectory(dir.clone()));
        }

        let (stdin, stdout) = open_redirects(&self.streams)?;
        let spawn_err = |source: io::Error| LaunchError::Spawn {
            program: program.to_owned(),
            source,
        };

        let cwd = self
            .cwd
            .as_deref()
            .map(|dir| posix::os_to_cstring(dir.as_os_str()))
            .transpose()
            .map_err(spawn_err)?;
        let just_exec =
            posix::prep_exec(OsStr::new(program), self.command.as_slice()).map_err(spawn_err)?;

        let mut exec_fail_pipe = posix::pipe().map_err(spawn_err)?;

        let pid = match unsafe { posix::fork() }.map_err(spawn_err)? {
            Some(pid) => pid,
            None => {
                drop(exec_fail_pipe.0);
                let error = child_exec(just_exec, cwd.as_ref(), stdin.as_ref(), stdout.as_ref());
                let errno = error.raw_os_error().unwrap_or(libc::EINVAL) as u32;
                exec_fail_pipe.1.write_all(&errno.to_le_bytes()).ok();
                posix::_exit(127);
            }
        };

        // Close the parent's copies of the child's files before blocking on the pipe.
        drop(stdin);
        drop(stdout);
        drop(exec_fail_pipe.1);

        let mut child = ChildHandle::new(pid);
        match read_exact_or_eof::<4>(&mut exec_fail_pipe.0).map_err(spawn_err)? {
            None => {
                debug!(pid, command = %self.command, cwd = ?self.cwd, "child started");
                Ok(child)
            }
            Some(buf) => {
                let errno = u32::from_le_bytes(buf) as i32;
                // reap the forked child, which has already called _exit
                let _ = child.wait();
                Err(LaunchError::from_exec_errno(program, errno))
            }
        }
    }
}

fn open_redirects(streams: &StreamPolicy) -> Result<(Option<File>, Option<File>), LaunchError> {
    fn redirect_err(path: &Path) -> impl FnOnce(io::Error) -> LaunchError + '_ {
        move |source| LaunchError::Redirect {
            path: path.to_owned(),
            source,
        }
    }

    match streams {
        StreamPolicy::Inherit => Ok((None, None)),
        StreamPolicy::OutputToFile(output) => {
            let out = File::create(output).map_err(redirect_err(output))?;
            Ok((None, Some(out)))
        }
        StreamPolicy::InputOutputFiles { input, output } => {
            // open the input first so a missing input doesn't truncate the output
            let inp = File::open(input).map_err(redirect_err(input))?;
            let out = File::create(output).map_err(redirect_err(output))?;
            Ok((Some(inp), Some(out)))
        }
    }
}

/// Runs in the forked child. Returns only on failure.
fn child_exec(
    just_exec: impl FnOnce() -> io::Error,
    cwd: Option<&std::ffi::CString>,
    stdin: Option<&File>,
    stdout: Option<&File>,
) -> io::Error {
    let setup = || -> io::Result<()> {
        if let Some(dir) = cwd {
            posix::chdir(dir)?;
        }
        dup2_if_needed(stdin, 0)?;
        dup2_if_needed(stdout, 1)?;
        posix::reset_sigpipe()
    };
    match setup() {
        Ok(()) => just_exec(),
        Err(e) => e,
    }
}

fn dup2_if_needed(file: Option<&File>, target_fd: i32) -> io::Result<()> {
    if let Some(f) = file
        && f.as_raw_fd() != target_fd
    {
        posix::dup2(f.as_raw_fd(), target_fd)?;
    }
    Ok(())
}

/// Read exactly N bytes, or return None on immediate EOF. Similar to
/// read_exact(), but distinguishes between no read and partial read
/// (which is treated as error).
fn read_exact_or_eof<const N: usize>(source: &mut File) -> io::Result<Option<[u8; N]>> {
    let mut buf = [0u8; N];
    let mut total_read = 0;
    while total_read < N {
        let n = match source.read(&mut buf[total_read..]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            break;
        }
        total_read += n;
    }
    match total_read {
        0 => Ok(None),
        n if n == N => Ok(Some(buf)),
        _ => Err(io::ErrorKind::UnexpectedEof.into()),
    }
}
