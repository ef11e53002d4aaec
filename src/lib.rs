//! Launch a child process and supervise it under a chosen policy.
//!
//! The crate is built from three layers:
//!
//! * [`Launch`] starts exactly one child from a [`CommandSpec`], optionally in another
//!   working directory and with stdin/stdout bound to files ([`StreamPolicy`]). Every
//!   check that can be done up front happens before `fork()`, so a failed launch leaves
//!   no process behind.
//! * [`ChildHandle`] tracks the child: unbounded and bounded waits, non-blocking polls,
//!   and signals. Killing a child that already finished is a no-op.
//! * [`Supervisor`] implements the five [`Policy`] variants on top of the two and
//!   reports an [`ExecutionOutcome`].
//!
//! The [`cli`] module routes `<selector> <args...>` to a policy and computes the
//! process exit code.
//!
//! Supervise `sleep` with a deadline:
//!
//! ```no_run
//! # use childwarden::*;
//! # use std::time::Duration;
//! # fn dummy() -> childwarden::Result<()> {
//! let config = SupervisorConfig {
//!     deadline: Duration::from_secs(1),
//!     ..Default::default()
//! };
//! let mut supervisor = Supervisor::new(config, std::io::stdout(), std::io::stderr());
//! let result = supervisor.run(Policy::Deadline, CommandSpec::new(["sleep", "10"]))?;
//! if let Supervised::Completed(outcome) = result {
//!     assert_eq!(outcome.classification(), Classification::Destroyed);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg(unix)]

pub mod cli;
mod error;
mod launch;
mod outcome;
mod posix;
mod process;
mod strategy;

#[cfg(test)]
mod tests;

use std::io;

pub use error::{LaunchError, Result, SuperviseError};
pub use launch::{CommandSpec, Launch, StreamPolicy};
pub use outcome::{Classification, ExecutionOutcome};
pub use process::{ChildHandle, ExitStatus};
pub use strategy::{
    AFTER_WAIT, DEFAULT_SEARCH_PROGRAM, Policy, STARTUP_MARKER, Supervised, Supervisor,
    SupervisorConfig,
};

/// Make `SIGINT` interrupt waits instead of killing the supervisor.
///
/// After this call, a Ctrl-C while a [`ChildHandle`] wait is in progress makes the
/// wait fail with [`io::ErrorKind::Interrupted`], which [`Supervisor`] reports as
/// [`Supervised::Interrupted`]. The child keeps the default `SIGINT` behavior.
///
/// Unbounded waits then poll the child instead of blocking in `waitpid`, noticing
/// the child's exit or an interrupt within 100ms.
pub fn install_interrupt_handler() -> io::Result<()> {
    posix::install_interrupt_handler(posix::SIGINT)
}
