//! Command-line routing: turn `<selector> <args...>` into a supervision run and an
//! exit code.

use std::error::Error as _;
use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use tracing::debug;

use crate::error::SuperviseError;
use crate::launch::CommandSpec;
use crate::outcome::ExecutionOutcome;
use crate::strategy::{DEFAULT_SEARCH_PROGRAM, Policy, Supervised, Supervisor, SupervisorConfig};

pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_LAUNCH_ERROR: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 3;

pub const USAGE: &str = "\
Command guide:
1: wait for the command ->\t\t(Example: 1 ls -l)
2: wait and report every poll interval ->\t(Example: 2 sleep 12)
3: wait up to the deadline, then kill ->\t(Example: 3 sleep 60)
4: run in a directory (last argument) ->\t(Example: 4 ls -l /tmp)
5: search and save matches ->\t\t(Example: 5 \"text_to_find\" input.txt output.txt)";

/// Launch a child process and supervise it under one of five policies.
#[derive(Debug, Parser)]
#[command(name = "childwarden", version, about)]
pub struct Cli {
    /// Seconds between heartbeats for policy 2
    #[arg(long, value_name = "SECS", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Seconds policy 3 lets the child run before killing it
    #[arg(long, value_name = "SECS", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub deadline: u64,

    /// Program policy 5 runs as `PROG term input`
    #[arg(long, value_name = "PROG", default_value = DEFAULT_SEARCH_PROGRAM)]
    pub search_program: String,

    /// Policy selector (1-5) followed by the command and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "SELECTOR ARGS")]
    pub args: Vec<String>,
}

impl Cli {
    pub fn config(&self) -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: Duration::from_secs(self.poll_interval),
            deadline: Duration::from_secs(self.deadline),
            search_program: self.search_program.clone(),
        }
    }
}

/// What the selector and its arguments ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Print the usage guide and exit with the given code.
    Usage { exit_code: i32 },
    /// Supervise `command` under `policy`.
    Run { policy: Policy, command: CommandSpec },
}

/// Map `[selector, args...]` to a route. Performs no I/O.
pub fn route(args: &[String]) -> Route {
    let [selector, rest @ ..] = args else {
        return Route::Usage {
            exit_code: EXIT_USAGE,
        };
    };
    if rest.is_empty() {
        return Route::Usage {
            exit_code: EXIT_USAGE,
        };
    }
    let Some(policy) = Policy::from_selector(selector) else {
        return Route::Usage { exit_code: EXIT_OK };
    };
    let arity_ok = match policy {
        Policy::Directory => rest.len() >= 2,
        Policy::Search => rest.len() == 3,
        _ => true,
    };
    if !arity_ok {
        return Route::Usage {
            exit_code: EXIT_USAGE,
        };
    }
    Route::Run {
        policy,
        command: CommandSpec::new(rest.iter().cloned()),
    }
}

/// The result of one invocation: what happened and how the process should exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub outcome: Option<ExecutionOutcome>,
    pub exit_code: i32,
}

/// Carry out `route`, writing status lines to `out` and diagnostics to `err`.
pub fn dispatch<O: Write, E: Write>(
    route: Route,
    config: SupervisorConfig,
    mut out: O,
    mut err: E,
) -> io::Result<Dispatch> {
    let (policy, command) = match route {
        Route::Usage { exit_code } => {
            writeln!(out, "{USAGE}")?;
            out.flush()?;
            return Ok(Dispatch {
                outcome: None,
                exit_code,
            });
        }
        Route::Run { policy, command } => (policy, command),
    };

    let mut supervisor = Supervisor::new(config, &mut out, &mut err);
    let result = supervisor.run(policy, command.clone());
    drop(supervisor);

    let dispatch = match result {
        Ok(Supervised::Completed(outcome)) => Dispatch {
            outcome: Some(outcome),
            exit_code: EXIT_OK,
        },
        Ok(Supervised::InputRejected(path)) => {
            debug!(path = %path.display(), "search input rejected");
            Dispatch {
                outcome: None,
                exit_code: EXIT_OK,
            }
        }
        Ok(Supervised::Interrupted(command)) => {
            writeln!(err, "Process interrupted")?;
            Dispatch {
                outcome: Some(ExecutionOutcome::interrupted(command)),
                exit_code: EXIT_INTERRUPTED,
            }
        }
        Err(e) => {
            report_error(&mut err, &e)?;
            // only a failed launch says anything about the command itself
            let outcome = match e {
                SuperviseError::Launch(_) => Some(ExecutionOutcome::launch_failed(command)),
                _ => None,
            };
            Dispatch {
                outcome,
                exit_code: e.exit_code(),
            }
        }
    };

    if let Some(outcome) = &dispatch.outcome {
        writeln!(out, "{outcome}")?;
    }
    out.flush()?;
    err.flush()?;
    Ok(dispatch)
}

fn report_error(err: &mut impl Write, e: &SuperviseError) -> io::Result<()> {
    writeln!(err, "Error while executing the process")?;
    writeln!(err, "Detailed information")?;
    writeln!(err, "---------------------")?;
    writeln!(err, "{e}")?;
    let mut source = e.source();
    while let Some(cause) = source {
        writeln!(err, "  caused by: {cause}")?;
        source = cause.source();
    }
    writeln!(err, "----------------------")
}

/// Entry point used by the binary: route, supervise, and return the exit code.
pub fn run(cli: Cli) -> i32 {
    let config = cli.config();
    let routed = route(&cli.args);
    if let Route::Run { .. } = routed
        && let Err(e) = crate::install_interrupt_handler()
    {
        debug!(error = %e, "could not install interrupt handler");
    }
    match dispatch(routed, config, io::stdout(), io::stderr()) {
        Ok(dispatch) => dispatch.exit_code,
        // stdout or stderr is gone; nothing left to report to
        Err(_) => EXIT_LAUNCH_ERROR,
    }
}
