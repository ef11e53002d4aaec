//! Supervision policies.
//!
//! Every policy launches exactly one child through [`Launch`], writes
//! [`STARTUP_MARKER`] as soon as the child is running, and then blocks the calling
//! thread until the child reaches a terminal state. Status lines are flushed as they
//! are written, so everything printed before a wait reaches the terminal before
//! anything printed after it.

use std::fmt;
use std::io::{self, Write};
use std::path::{self, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{LaunchError, Result, SuperviseError};
use crate::launch::{CommandSpec, Launch, StreamPolicy};
use crate::outcome::ExecutionOutcome;
use crate::process::{ChildHandle, ExitStatus};

/// Written right after the child starts, before the supervisor blocks on it.
pub const STARTUP_MARKER: &str = "I should always appear first";

/// Written by the immediate policy once the wait returns.
pub const AFTER_WAIT: &str = "When do I appear?";

pub const DEFAULT_SEARCH_PROGRAM: &str = "grep";

/// How a child is supervised once it's started.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Block until the child exits.
    Immediate,
    /// Wait in bounded slices, printing a heartbeat after each slice that times out.
    Heartbeat,
    /// Wait once with a deadline and kill the child if it is still running.
    Deadline,
    /// Run in the directory given as the last element of the command.
    Directory,
    /// Search for a term in an input file, writing the matches to an output file.
    Search,
}

impl Policy {
    /// Map a numeric CLI selector to a policy.
    pub fn from_selector(selector: &str) -> Option<Policy> {
        match selector {
            "1" => Some(Policy::Immediate),
            "2" => Some(Policy::Heartbeat),
            "3" => Some(Policy::Deadline),
            "4" => Some(Policy::Directory),
            "5" => Some(Policy::Search),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Policy::Immediate => "immediate",
            Policy::Heartbeat => "heartbeat",
            Policy::Deadline => "deadline",
            Policy::Directory => "directory",
            Policy::Search => "search",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunables for the supervision policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Length of each bounded wait in the heartbeat policy.
    pub poll_interval: Duration,
    /// How long the deadline policy lets the child run.
    pub deadline: Duration,
    /// Program run by the search policy as `program term input`.
    pub search_program: String,
}

impl Default for SupervisorConfig {
    fn default() -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(5),
            search_program: DEFAULT_SEARCH_PROGRAM.to_owned(),
        }
    }
}

/// How a supervision run ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supervised {
    /// The child reached a terminal state, on its own or by being killed.
    Completed(ExecutionOutcome),
    /// The wait was interrupted. The child was left running and detached.
    Interrupted(CommandSpec),
    /// The search input isn't an existing regular file; nothing was launched.
    InputRejected(PathBuf),
}

/// Runs supervision policies, writing status lines to `out` and child failures to
/// `err`.
pub struct Supervisor<O, E> {
    config: SupervisorConfig,
    out: O,
    err: E,
}

impl<O: Write, E: Write> Supervisor<O, E> {
    pub fn new(config: SupervisorConfig, out: O, err: E) -> Supervisor<O, E> {
        Supervisor { config, out, err }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Give back the output sinks.
    pub fn into_writers(self) -> (O, E) {
        (self.out, self.err)
    }

    /// Launch `command` and supervise it under `policy`.
    pub fn run(&mut self, policy: Policy, command: CommandSpec) -> Result<Supervised> {
        debug!(%policy, %command, "supervising");
        match policy {
            Policy::Immediate => self.immediate(command),
            Policy::Heartbeat => self.heartbeat(command),
            Policy::Deadline => self.deadline(command),
            Policy::Directory => self.in_directory(command),
            Policy::Search => self.search(command),
        }
    }

    fn immediate(&mut self, command: CommandSpec) -> Result<Supervised> {
        let mut child = self.start(Launch::new(&command))?;
        let status = match wait(&mut child)? {
            Waited::Exited(status) => status,
            Waited::Interrupted => return Ok(Supervised::Interrupted(command)),
        };
        self.say(AFTER_WAIT)?;
        Ok(Supervised::Completed(ExecutionOutcome::exited(command, status)))
    }

    fn heartbeat(&mut self, command: CommandSpec) -> Result<Supervised> {
        let interval = self.config.poll_interval;
        // slice k ends at started + k * interval, however long printing takes
        let started = Instant::now();
        let mut child = self.start(Launch::new(&command))?;
        let mut elapsed = Duration::ZERO;
        loop {
            let next = started + elapsed + interval;
            let slice = next.saturating_duration_since(Instant::now());
            match wait_timeout(&mut child, slice)? {
                Waited::Exited(Some(_)) => break,
                Waited::Exited(None) => {
                    elapsed += interval;
                    self.say(format_args!(
                        "{elapsed:?} have passed with the process running."
                    ))?;
                }
                Waited::Interrupted => return Ok(Supervised::Interrupted(command)),
            }
        }
        // the bounded wait already cached the status; this returns it unchanged
        let status = match wait(&mut child)? {
            Waited::Exited(status) => status,
            Waited::Interrupted => return Ok(Supervised::Interrupted(command)),
        };
        Ok(Supervised::Completed(ExecutionOutcome::exited(command, status)))
    }

    fn deadline(&mut self, command: CommandSpec) -> Result<Supervised> {
        let deadline = self.config.deadline;
        let mut child = self.start(Launch::new(&command))?;
        let pid = child.pid();
        match wait_timeout(&mut child, deadline)? {
            Waited::Exited(Some(status)) => {
                Ok(Supervised::Completed(ExecutionOutcome::exited(command, status)))
            }
            Waited::Exited(None) => {
                info!(pid, ?deadline, "deadline passed, killing child");
                child
                    .kill()
                    .map_err(|source| SuperviseError::Wait { pid, source })?;
                let status = match wait(&mut child)? {
                    Waited::Exited(status) => status,
                    Waited::Interrupted => return Ok(Supervised::Interrupted(command)),
                };
                self.say(format_args!("{deadline:?} passed. Process destroyed."))?;
                Ok(Supervised::Completed(ExecutionOutcome::destroyed(command, status)))
            }
            Waited::Interrupted => Ok(Supervised::Interrupted(command)),
        }
    }

    fn in_directory(&mut self, command: CommandSpec) -> Result<Supervised> {
        let (dir, program) = match command.split_last() {
            Some((dir, program)) if !program.is_empty() => (dir, program),
            _ => {
                return Err(SuperviseError::Arguments {
                    policy: Policy::Directory.name(),
                    expected: "a command followed by a directory, at least 2",
                    got: command.len(),
                });
            }
        };
        let dir = path::absolute(dir)
            .map_err(|_| LaunchError::InvalidDirectory(PathBuf::from(dir)))?;
        self.say(dir.display())?;

        let mut child = self.start(Launch::new(&program).cwd(&dir))?;
        let status = match wait(&mut child)? {
            Waited::Exited(status) => status,
            Waited::Interrupted => return Ok(Supervised::Interrupted(command)),
        };
        if status.success() {
            self.say(format_args!(
                "Command executed successfully in directory: {}",
                dir.display()
            ))?;
        } else {
            self.say(format_args!(
                "Error executing command in directory: {}",
                dir.display()
            ))?;
        }
        Ok(Supervised::Completed(ExecutionOutcome::exited(command, status)))
    }

    fn search(&mut self, command: CommandSpec) -> Result<Supervised> {
        let [term, input, output] = command.as_slice() else {
            return Err(SuperviseError::Arguments {
                policy: Policy::Search.name(),
                expected: "exactly 3 (term, input file, output file)",
                got: command.len(),
            });
        };

        let input_path = PathBuf::from(input);
        if !input_path.is_file() {
            let shown = path::absolute(&input_path).unwrap_or(input_path);
            self.say(format_args!(
                "Input file does not exist: {}",
                shown.display()
            ))?;
            return Ok(Supervised::InputRejected(shown));
        }

        let search = CommandSpec::new([
            self.config.search_program.as_str(),
            term.as_str(),
            input.as_str(),
        ]);
        let launch =
            Launch::new(&search).streams(StreamPolicy::OutputToFile(PathBuf::from(output)));
        let mut child = self.start(launch)?;
        let status = match wait(&mut child)? {
            Waited::Exited(status) => status,
            Waited::Interrupted => return Ok(Supervised::Interrupted(command)),
        };
        if status.success() {
            self.say("The search completed successfully.")?;
        } else {
            writeln!(self.err, "The search process failed ({status}).")?;
            self.err.flush()?;
        }
        Ok(Supervised::Completed(ExecutionOutcome::exited(command, status)))
    }

    /// Start the child and announce it.
    fn start(&mut self, launch: Launch<'_>) -> Result<ChildHandle> {
        let child = launch.start()?;
        self.say(STARTUP_MARKER)?;
        Ok(child)
    }

    fn say(&mut self, line: impl fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}

enum Waited<T> {
    Exited(T),
    Interrupted,
}

/// Unbounded wait. On interruption the child is detached so that dropping the handle
/// doesn't block again.
fn wait(child: &mut ChildHandle) -> Result<Waited<ExitStatus>> {
    interpret(child, |child| child.wait())
}

/// Bounded wait; `Exited(None)` means the timeout elapsed first.
fn wait_timeout(child: &mut ChildHandle, dur: Duration) -> Result<Waited<Option<ExitStatus>>> {
    interpret(child, |child| child.wait_timeout(dur))
}

fn interpret<T>(
    child: &mut ChildHandle,
    op: impl FnOnce(&mut ChildHandle) -> io::Result<T>,
) -> Result<Waited<T>> {
    match op(child) {
        Ok(value) => Ok(Waited::Exited(value)),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
            debug!(pid = child.pid(), "wait interrupted, detaching child");
            child.detach();
            Ok(Waited::Interrupted)
        }
        Err(source) => Err(SuperviseError::Wait {
            pid: child.pid(),
            source,
        }),
    }
}
